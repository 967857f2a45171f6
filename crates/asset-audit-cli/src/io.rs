use anyhow::{Context, Result};
use asset_audit_core::{AuditConfig, AuditReport, Portfolio};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("cannot open {} {}", what, path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("cannot parse {} {}", what, path.display()))
}

/// Read a portfolio export; the Spanish source keys are accepted as aliases.
pub fn load_portfolio(path: &Path) -> Result<Portfolio> {
    let portfolio: Portfolio = read_json(path, "portfolio")?;
    info!(
        path = %path.display(),
        machinery = portfolio.machinery.len(),
        real_estate = portfolio.real_estate.len(),
        intangibles = portfolio.intangibles.len(),
        other_assets = portfolio.other_assets.len(),
        "portfolio loaded"
    );
    Ok(portfolio)
}

/// Read a config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<AuditConfig> {
    match path {
        Some(path) => {
            let config = read_json(path, "config")?;
            debug!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(AuditConfig::default()),
    }
}

pub fn load_report(path: &Path) -> Result<AuditReport> {
    read_json(path, "report")
}

/// Write the enriched report as pretty JSON, to stdout when no path is given.
pub fn write_report(report: &AuditReport, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create report {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
            info!(path = %path.display(), records = report.record_count(), "report written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, report)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_audit_core::AuditPipeline;
    use chrono::{TimeZone, Utc};
    use std::fs;

    const EXPORT: &str = r#"{
        "maquinarias": [
            {"id_equipo": "EQ-1000", "tipo_equipo": "Torno CNC", "fecha_adquisicion": "2019-02-01",
             "valor_adquisicion": 250000, "vida_util_anios": 10, "fecha_fin_vida_util": "2029-01-29"}
        ],
        "inmuebles": [],
        "intangibles": [
            {"activo_id": "INT-30000", "empresa_id": 3001, "fecha_adquisicion": "2022-01-01",
             "costo_adquisicion": 10000, "vida_util_anios": 5,
             "amortizacion_acumulada_simulada": 4000, "valor_neto_contable_simulado": 6000}
        ]
    }"#;

    #[test]
    fn test_load_portfolio_from_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        fs::write(&path, EXPORT).unwrap();

        let portfolio = load_portfolio(&path).unwrap();
        assert_eq!(portfolio.machinery.len(), 1);
        assert_eq!(portfolio.intangibles[0].owner_id, Some(3001));
        assert!(portfolio.other_assets.is_empty());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_portfolio(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.json"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        fs::write(&path, r#"{"seed": 7, "machinery": {"threshold": 3.0}}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.machinery.threshold, 3.0);
        assert_eq!(config.real_estate.threshold, 3.0);
        assert_eq!(config.model, AuditConfig::default().model);
        assert_eq!(load_config(None).unwrap().seed, 42);
    }

    #[test]
    fn test_report_written_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("portfolio.json");
        let output = dir.path().join("enriched.json");
        fs::write(&input, EXPORT).unwrap();

        let config = AuditConfig::default()
            .with_reference(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let report = AuditPipeline::new(config)
            .unwrap()
            .run(&load_portfolio(&input).unwrap())
            .unwrap();
        write_report(&report, Some(&output)).unwrap();

        let reloaded = load_report(&output).unwrap();
        assert_eq!(reloaded.run_id, report.run_id);
        assert_eq!(reloaded.record_count(), 2);
        assert_eq!(reloaded.intangibles.records[0].record.id, "INT-30000");
        assert_eq!(
            reloaded.machinery.records[0].outcome.verdict(),
            report.machinery.records[0].outcome.verdict()
        );
    }
}
