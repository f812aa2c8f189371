//! Generates the Swift and Kotlin bindings for `orderkit-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
