use std::io::Write;

use anstyle::{AnsiColor, Color, RgbColor, Style};

/// 初始化全局 logger
///
/// 默认等级为 Info，可以通过 `RUST_LOG` 覆盖。重复调用不会 panic。
pub fn init_log() {
    let _ = builder().try_init();
}

/// 测试中使用：输出交给 test harness 捕获
pub fn init_test_log() {
    let _ = builder().is_test(true).filter(None, log::LevelFilter::Debug).try_init();
}

fn level_style(level: log::Level) -> Style {
    let color = match level {
        log::Level::Error => AnsiColor::Red,
        log::Level::Warn => AnsiColor::Yellow,
        log::Level::Info => AnsiColor::Green,
        log::Level::Debug => AnsiColor::Blue,
        log::Level::Trace => AnsiColor::Magenta,
    };
    Style::new().fg_color(Some(Color::Ansi(color))).bold()
}

fn builder() -> env_logger::Builder {
    let location_style = Style::new().fg_color(Some(Color::Rgb(RgbColor(110, 110, 110))));

    let mut builder = env_logger::Builder::new();
    builder
        .format(move |buf, record| {
            let style = level_style(record.level());
            // windows 和 unix 的路径分隔符都要处理
            let file = record.file().and_then(|f| f.rsplit(['/', '\\']).next()).unwrap_or("?");
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "{style}[{}] {:<5}{style:#} {location_style}[{file}:{line}]{location_style:#} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env();
    builder
}
