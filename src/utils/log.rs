// src/utils/log.rs

//! Banner-style run logging on top of the `log` facade.

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Format an elapsed duration as `1m 05s` or `12.3s`.
pub fn format_elapsed(elapsed: chrono::TimeDelta) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    if millis >= 60_000 {
        format!("{}m {:02}s", millis / 60_000, (millis % 60_000) / 1000)
    } else {
        format!("{:.1}s", millis as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::TimeDelta::milliseconds(12_300)), "12.3s");
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(65)), "1m 05s");
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(-3)), "0.0s");
    }
}
