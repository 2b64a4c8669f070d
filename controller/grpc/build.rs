fn main() -> Result<(), Box<dyn std::error::Error>> {
    let files = &["proto/argon/config.proto"];
    let dirs = &["proto"];

    // Builds do not depend on a system `protoc`.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_client(false)
        .build_server(true)
        .compile_protos(files, dirs)?;

    // recompile protobufs only if any of the proto files changes.
    for file in files {
        println!("cargo:rerun-if-changed={file}");
    }
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
