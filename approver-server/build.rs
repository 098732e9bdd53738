fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Allow packagers to stamp the commit when building outside a git checkout
    println!("cargo:rerun-if-env-changed=APPROVER_GIT_HASH");
    if let Ok(hash) = std::env::var("APPROVER_GIT_HASH") {
        println!("cargo:rustc-env=APPROVER_GIT_HASH={}", hash);
    }
}
