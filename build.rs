fn main() {
    // Only the ESP-IDF target needs the embuild environment; host builds
    // (unit + integration tests) are pure Rust.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
