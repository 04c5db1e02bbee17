fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Ensure a `protoc` binary is available in environments without a system install.
    if std::env::var_os("PROTOC").is_none() {
        unsafe {
            std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
        }
    }
    // Generate message code from the shared tenant-event schema.
    prost_build::compile_protos(&["proto/tenant.proto"], &["proto/"])?;
    Ok(())
}
