//! End-to-end integration tests

use price_sentinel::config::{Config, LogFormatConfig};
use rust_decimal_macros::dec;

#[test]
fn test_config_example_loads() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.rotation.slice_size, 500);
    assert_eq!(config.rotation.slot_minutes, 15);
    assert_eq!(config.quarantine.days, 7);
    assert_eq!(config.detection.volume_multiplier, dec!(2.0));
    assert_eq!(config.simulation.stop_loss_pct, dec!(-3.0));
    assert_eq!(config.report.top_n, 5);
    assert_eq!(config.telemetry.log_format, LogFormatConfig::Pretty);
}

#[test]
fn test_invalid_stop_loss_is_rejected() {
    let toml = r#"
        [simulation]
        stop_loss_pct = 3.0

        [store]
        database_url = "sqlite::memory:"

        [telemetry]
        log_level = "info"
    "#;
    assert!(Config::from_toml(toml).is_err());
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    let printed = toml::to_string_pretty(&config).unwrap();
    assert!(printed.contains("[detection]"));
    assert!(printed.contains("cooldown_hours"));
    let reparsed: Config = toml::from_str(&printed).unwrap();
    assert_eq!(reparsed.simulation.take_profit_pct, config.simulation.take_profit_pct);
}
