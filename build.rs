use std::env;

/// On Linux, `notify`'s inotify backend has historically needed a hand-rolled
/// walk-and-watch-each-directory recursion rather than trusting the OS to
/// recurse; this mirrors that by emitting a cfg the backend checks at
/// `add`-time. macOS (FSEvents) and Windows (ReadDirectoryChangesW) both
/// recurse natively and don't need it.
fn main() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    println!("cargo:rustc-check-cfg=cfg(manual_recursive_watch)");
    if target_os == "linux" {
        println!("cargo:rustc-cfg=manual_recursive_watch");
    }
}
