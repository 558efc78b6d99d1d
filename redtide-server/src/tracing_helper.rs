use std::{num::NonZeroU8, panic};

use anyhow::{anyhow, Result};
use time::format_description::well_known::{iso8601, Iso8601};
use tracing::{error, Level, Subscriber};
use tracing_subscriber::{
    fmt::{time::LocalTime, writer::MakeWriterExt},
    prelude::__tracing_subscriber_SubscriberExt,
    EnvFilter, Layer,
};

const TIMESTAMP: iso8601::EncodedConfig = iso8601::Config::DEFAULT
    .set_time_precision(iso8601::TimePrecision::Second {
        decimal_digits: NonZeroU8::new(3),
    })
    .encode();

fn crate_filter() -> EnvFilter {
    let level = if cfg!(debug_assertions) {
        "trace"
    } else {
        "info"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={level},redtide_lib={level}",
            env!("CARGO_CRATE_NAME")
        ))
    })
}

/// Console output plus a log file under `dir` that keeps warnings and errors.
fn subscriber(dir: &str, file_name: &str, ansi: bool) -> impl Subscriber + Send + Sync {
    let default_layer = || {
        const WITH_FILE_PATH: bool = cfg!(debug_assertions);
        tracing_subscriber::fmt::layer()
            .compact()
            .with_file(WITH_FILE_PATH)
            .with_line_number(WITH_FILE_PATH)
            .with_target(!WITH_FILE_PATH)
            .with_thread_ids(true)
            .with_timer(LocalTime::new(Iso8601::<TIMESTAMP>))
    };
    let file = tracing_appender::rolling::never(dir, file_name).with_max_level(Level::WARN);

    let file_layer = default_layer()
        .with_ansi(false)
        .with_writer(file)
        .with_filter(crate_filter());
    let console_layer = default_layer()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_filter(crate_filter());
    tracing_subscriber::registry().with(file_layer.and_then(console_layer))
}

pub fn init_tracing(dir: &str, file_name: &str, ansi: bool) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(dir, file_name, ansi))
        .map_err(|err| anyhow!("failed to install subscriber: {}", err))?;

    panic::set_hook(Box::new(|panic| error!("{}", panic)));
    Ok(())
}
