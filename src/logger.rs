use std::time::Instant;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::{config::CombiConfig, errors::{CombiError, Result}};

/// Install a stdout subscriber filtered at `settings.log_level` (any `EnvFilter` directive,
/// e.g. `"info"` or `"sgcombi=debug"`).
///
/// Only the first call installs a subscriber, later calls are accepted and ignored.
pub fn setup_log(settings: &CombiConfig) -> Result<()>
{
    let level = settings.log_level.as_str();
    let env_filter = EnvFilter::try_new(level)
        .map_err(|e| CombiError::InvalidConfiguration(format!("invalid log level {level:?}: {e}")))?;

    let timestamper = CompactTimestamp { start: Instant::now() };

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_timer(timestamper);

    if Registry::default().with(env_filter).with(stdout_layer).try_init().is_err()
    {
        tracing::debug!("a global subscriber is already installed");
    }
    Ok(())
}

/// Elapsed time since the subscriber was installed.
#[derive(Clone)]
struct CompactTimestamp
{
    start: Instant,
}

impl FormatTime for CompactTimestamp
{
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::result::Result<(), std::fmt::Error>
    {
        let elapsed = self.start.elapsed();
        let hours = elapsed.as_secs() / 3600;
        let minutes = (elapsed.as_secs() % 3600) / 60;
        let seconds = elapsed.as_secs() % 60;
        let millis = elapsed.subsec_millis();

        write!(w, "{hours:02}h {minutes:02}m {seconds:02}.{millis:03}s")
    }
}

#[test]
fn check_setup_log()
{
    let settings = |level: &str| CombiConfig { log_level: level.to_string(), ..Default::default() };
    setup_log(&settings("debug")).unwrap();
    setup_log(&settings("info")).unwrap();
    assert!(setup_log(&settings("sgcombi=notalevel")).is_err());
}
