use env_logger::{Builder, Env};
use std::io::Write;

/// Initialize the logging system for one daemon.
///
/// Format: `[YYYY-mm-dd HH:MM:SS] [LEVEL] [COMPONENT] message`. The level
/// defaults to INFO and can be overridden through `RUST_LOG`.
pub fn init_logger(component: &'static str) {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                component,
                record.args()
            )
        })
        .init();
}
