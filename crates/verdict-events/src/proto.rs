//! Protobuf wire types for inbound tenant lifecycle events.
//!
//! The message definitions live in `proto/tenant.proto` and are compiled
//! at build time; this module includes the generated code. The schema
//! mirrors what the tenant service publishes.

include!(concat!(env!("OUT_DIR"), "/verdict.tenant.rs"));

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn tenant_created_round_trips() {
        let event = TenantCreated {
            metadata: Some(EventMetadata {
                correlation_id: "corr-1".into(),
                user_id: "5f64d4a0-0000-4000-8000-000000000001".into(),
            }),
            tenant: Some(Tenant {
                tenant_id: "5f64d4a0-0000-4000-8000-000000000002".into(),
                tenant_code: "acme".into(),
            }),
        };

        let bytes = event.encode_to_vec();
        let decoded = TenantCreated::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn absent_metadata_decodes_to_none() {
        let event = TenantDeactivated {
            metadata: None,
            tenant_id: "5f64d4a0-0000-4000-8000-000000000003".into(),
        };

        let bytes = event.encode_to_vec();
        let decoded = TenantDeactivated::decode(bytes.as_slice()).unwrap();
        assert!(decoded.metadata.is_none());
        assert_eq!(decoded.tenant_id, event.tenant_id);
    }

    #[test]
    fn garbage_fails_to_decode() {
        // 0xff is an invalid field header.
        let err = TenantCreated::decode([0xffu8, 0xff, 0xff].as_slice());
        assert!(err.is_err());
    }
}
