use anyhow::{Context, Result};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// `-v`の指定回数からログレベルを決める。
pub fn level_from_verbosity(verbose: u64) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// 標準エラー出力にログを出力するよう設定する。
///
/// 依存クレートのログは`warn`以上に抑える。
pub fn init(level: LevelFilter) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {:<5} [{}] {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for("ever_timer", level)
        .chain(std::io::stderr())
        .apply()
        .context("Failed to initialize logger")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;
    use rstest::rstest;

    use super::level_from_verbosity;

    #[rstest]
    #[case(0, LevelFilter::Warn)]
    #[case(1, LevelFilter::Info)]
    #[case(2, LevelFilter::Debug)]
    #[case(5, LevelFilter::Trace)]
    fn test_level_from_verbosity(#[case] verbose: u64, #[case] expected: LevelFilter) {
        assert_eq!(level_from_verbosity(verbose), expected);
    }
}
