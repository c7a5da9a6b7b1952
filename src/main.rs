fn main() {
    #[cfg(feature = "cli")]
    blobpatch::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("blobpatch: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
