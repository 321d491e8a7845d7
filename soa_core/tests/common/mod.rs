use std::sync::OnceLock;

/// Installs a test-writer subscriber once per test binary. Set `RUST_LOG`
/// to see reallocation and rehash events.
pub fn init_test_logger() {
    static INIT: OnceLock<()> = OnceLock::new();
    let _ = INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
