/// Builds the gRPC client and server code for the `catalog.proto` definition
/// using `tonic-prost-build`.
///
/// Both the `LaptopService` and the `AuthService` are generated, together with
/// an encoded file descriptor set so the server can expose gRPC reflection.
///
/// # Byte Field Optimization
///
/// The `chunk_data` variant of `UploadImageRequest` is marked with
/// `.bytes(...)` so image chunks are deserialized as `Bytes` (from the `bytes`
/// crate) instead of `Vec<u8>`. The upload handler appends chunks straight
/// into a `BytesMut` without an intermediate copy per message.
///
/// # Files and Paths
///
/// - Proto file: `proto/catalog.proto`
/// - Includes: `proto/`
///
/// # Output
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("catalog");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("catalog_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".catalog.UploadImageRequest"])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/catalog.proto"], &["proto"])
        .unwrap();
}
