fn main() {
    // Stamp the binary with its build date
    let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    println!("cargo:rustc-env=BUILD_DATE={}", stamp);
}
