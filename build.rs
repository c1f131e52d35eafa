fn main() {
    // ESP-IDF link arguments are only relevant for the flashable
    // binaries; host builds (tests) skip them entirely.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
