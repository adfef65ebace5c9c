use std::sync::LazyLock;

/// Whether to keep database containers after a test finishes
///
/// This is set to `false` by default, but can be overridden by the `TESTS_KEEP_CONTAINERS` environment
/// variable. Kept containers carry the `hermetic.instance` label and must be removed by hand.
pub static TESTS_KEEP_CONTAINERS: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("TESTS_KEEP_CONTAINERS")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
});

/// Initialize color backtrace for better error messages in tests.
#[ctor::ctor]
fn init_color_backtrace() {
    color_backtrace::install();
}
