fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fall back to the bundled compiler when no `protoc` is configured.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    println!("cargo:rerun-if-changed=../proto/commands.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["../proto/commands.proto"], // The file to compile
            &["../proto"],                // The directory to search in
        )?;
    Ok(())
}
