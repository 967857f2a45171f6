use asset_audit_core::derive::EndOfLifeSource;
use asset_audit_core::record::{
    DateField, IntangibleRecord, MachineryRecord, Numeric, OtherAssetRecord, RealEstateRecord,
};
use asset_audit_core::{
    AuditConfig, AuditOutcome, AuditPipeline, MachineryVerdict, Portfolio, RealEstateVerdict,
    Verdict,
};
use chrono::{Months, NaiveDate, TimeZone, Utc};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> AuditConfig {
    AuditConfig::default().with_reference(Utc.with_ymd_and_hms(2025, 9, 1, 9, 30, 0).unwrap())
}

fn machine(i: usize, value: f64, acquired: NaiveDate, end: NaiveDate) -> MachineryRecord {
    MachineryRecord {
        id: format!("EQ-{}", 1000 + i),
        equipment_type: "Torno CNC".to_string(),
        description: format!("Torno CNC modelo ABC-{:04}", i),
        location: "Planta A".to_string(),
        status: "Operativo".to_string(),
        acquisition_date: DateField::Valid(acquired),
        acquisition_value: Numeric::Value(value),
        useful_life_years: Numeric::Value(10.0),
        end_of_life_date: DateField::Valid(end),
    }
}

fn property(i: usize, value: f64, surface: f64, end: DateField) -> RealEstateRecord {
    RealEstateRecord {
        id: format!("INM-{}", 1000 + i),
        property_type: "Depósito".to_string(),
        address: format!("Calle {} 123", i),
        location: "Rosario".to_string(),
        status: "Operativo".to_string(),
        acquisition_date: DateField::Valid(date(2005 + (i % 15) as i32, 3, 10)),
        acquisition_value: Numeric::Value(value),
        surface_area: Numeric::Value(surface),
        end_of_life_date: end,
    }
}

fn intangible(i: usize, cost: f64, life: f64) -> IntangibleRecord {
    let accumulated = (cost / life.max(1.0)) * 2.0;
    IntangibleRecord {
        id: format!("INT-{}", 30000 + i),
        owner_id: Some(3000 + (i % 10) as u64),
        owner_name: "Empresa SA".to_string(),
        owner_tax_id: "30-12345678-9".to_string(),
        asset_type: "Software Licencia".to_string(),
        status: "Activo".to_string(),
        acquisition_date: DateField::Valid(date(2015 + (i % 10) as i32, 1, 15)),
        cost: Numeric::Value(cost),
        useful_life_years: Numeric::Value(life),
        simulated_accumulated_amortization: Numeric::Value(accumulated),
        simulated_net_book_value: Numeric::Value(cost - accumulated),
    }
}

fn other(i: usize, days_ago: u64) -> OtherAssetRecord {
    OtherAssetRecord {
        id: format!("OA-{}", 1000 + i),
        asset_type: "Valores a cobrar LP".to_string(),
        amount: Numeric::Value(10_000.0 + i as f64 * 1_000.0),
        currency: "ARS".to_string(),
        registration_date: DateField::Valid(date(2025, 9, 1) - chrono::Days::new(days_ago)),
        description: String::new(),
    }
}

fn mixed_portfolio() -> Portfolio {
    Portfolio {
        machinery: (0..30)
            .map(|i| {
                let acquired = date(2016 + (i % 8) as i32, 1 + (i % 12) as u32, 5);
                let end = acquired + Months::new(12 * (5 + (i % 11) as u32));
                machine(i, 200_000.0 + i as f64 * 150_000.0, acquired, end)
            })
            .collect(),
        real_estate: (0..30)
            .map(|i| {
                let end = if i % 3 == 0 {
                    DateField::Missing
                } else {
                    DateField::Valid(date(2080 + i as i32, 6, 1))
                };
                property(i, 100_000.0 + i as f64 * 400_000.0, 100.0 + i as f64 * 150.0, end)
            })
            .collect(),
        intangibles: (0..30)
            .map(|i| intangible(i, 50_000.0 + i as f64 * 60_000.0, (i % 8) as f64))
            .collect(),
        other_assets: (0..50).map(|i| other(i, (i as u64 * 7) % 120)).collect(),
    }
}

#[test]
fn test_outlier_machine_is_flagged_by_both_detectors() {
    let acquired = date(2020, 4, 1);
    let end = date(2030, 4, 1);
    let mut batch: Vec<MachineryRecord> = (0..9)
        .map(|i| machine(i, 1_000_000.0 + i as f64 * 1_000.0, acquired, end))
        .collect();
    batch.push(machine(9, 100_000_000.0, acquired, end));

    let pipeline = AuditPipeline::new(config()).unwrap();
    let report = pipeline
        .run(&Portfolio {
            machinery: batch,
            ..Default::default()
        })
        .unwrap();

    let verdicts: Vec<Verdict> = report
        .machinery
        .records
        .iter()
        .map(|a| a.outcome.verdict().unwrap())
        .collect();
    assert_eq!(verdicts[9], Verdict::Machinery(MachineryVerdict::BothFlagged));
    assert_eq!(verdicts[9].label(), "both flagged");
    for v in &verdicts[..9] {
        assert_eq!(*v, Verdict::Machinery(MachineryVerdict::NoAlert));
        assert_eq!(v.label(), "none");
    }
}

#[test]
fn test_record_count_preserved_for_every_class() {
    let portfolio = mixed_portfolio();
    let report = AuditPipeline::new(config()).unwrap().run(&portfolio).unwrap();
    assert_eq!(report.machinery.len(), portfolio.machinery.len());
    assert_eq!(report.real_estate.len(), portfolio.real_estate.len());
    assert_eq!(report.intangibles.len(), portfolio.intangibles.len());
    assert_eq!(report.other_assets.len(), portfolio.other_assets.len());
    assert_eq!(report.record_count(), portfolio.len());

    for (audited, original) in report.machinery.records.iter().zip(&portfolio.machinery) {
        assert_eq!(&audited.record, original, "order and content must be kept");
    }
}

#[test]
fn test_every_record_gets_exactly_one_outcome_shape() {
    let report = AuditPipeline::new(config()).unwrap().run(&mixed_portfolio()).unwrap();
    assert!(report.machinery.records.iter().all(|a| a.outcome.verdict().is_some()));
    assert!(report.real_estate.records.iter().all(|a| a.outcome.verdict().is_some()));
    assert!(report.intangibles.records.iter().all(|a| matches!(
        a.outcome,
        AuditOutcome::DiscrepancyOnly { .. }
    )));
    assert!(report.other_assets.records.iter().all(|a| a.outcome.verdict().is_none()));
}

#[test]
fn test_remaining_life_never_negative() {
    let batch: Vec<MachineryRecord> = (0..12)
        .map(|i| {
            let acquired = date(2000 + i as i32, 1, 1);
            // most of these expired before the reference date
            let end = date(2010 + i as i32, 1, 1);
            machine(i, 300_000.0 * (i + 1) as f64, acquired, end)
        })
        .collect();
    let report = AuditPipeline::new(config())
        .unwrap()
        .run(&Portfolio {
            machinery: batch,
            ..Default::default()
        })
        .unwrap();
    for audited in &report.machinery.records {
        assert!(audited.metrics.remaining_life_years >= 0.0);
    }
    assert!(report.machinery.records.iter().all(|a| a.metrics.remaining_life_years == 0.0));
}

#[test]
fn test_identical_values_produce_no_statistical_signal() {
    let batch: Vec<MachineryRecord> = (0..8)
        .map(|i| machine(i, 750_000.0, date(2019, 1, 1 + i as u32), date(2029, 1, 1)))
        .collect();
    let report = AuditPipeline::new(config())
        .unwrap()
        .run(&Portfolio {
            machinery: batch,
            ..Default::default()
        })
        .unwrap();
    for audited in &report.machinery.records {
        let signals = audited.outcome.signals().unwrap();
        assert_eq!(signals.deviation_score, 0.0);
        assert!(!signals.is_statistical_outlier);
    }
}

#[test]
fn test_expected_amortization_never_exceeds_cost() {
    let report = AuditPipeline::new(config()).unwrap().run(&mixed_portfolio()).unwrap();
    for audited in &report.intangibles.records {
        let m = &audited.metrics;
        assert!(m.expected_accumulated_amortization <= m.cost, "{}", audited.record.id);
        assert!(m.amortization_discrepancy.is_finite());
        assert!(m.discrepancy_vnc.is_finite());
    }
}

#[test]
fn test_zero_useful_life_yields_zero_amortization() {
    let report = AuditPipeline::new(config())
        .unwrap()
        .run(&Portfolio {
            intangibles: vec![intangible(0, 120_000.0, 0.0)],
            ..Default::default()
        })
        .unwrap();
    let m = &report.intangibles.records[0].metrics;
    assert_eq!(m.annual_amortization, 0.0);
    assert_eq!(m.expected_accumulated_amortization, 0.0);
}

#[test]
fn test_missing_end_of_life_is_synthesized_in_range() {
    let report = AuditPipeline::new(config()).unwrap().run(&mixed_portfolio()).unwrap();
    let synthesized: Vec<_> = report
        .real_estate
        .records
        .iter()
        .filter(|a| a.record.end_of_life_date.is_missing())
        .collect();
    assert_eq!(synthesized.len(), 10);
    for audited in synthesized {
        let life = &audited.metrics.lifecycle;
        assert_eq!(life.end_of_life_source, EndOfLifeSource::Synthesized);
        assert!(life.end_of_life_date >= life.acquisition_date + Months::new(12 * 50));
        assert!(life.end_of_life_date < life.acquisition_date + Months::new(12 * 100));
    }
    assert_eq!(report.real_estate.coercions.synthesized_end_of_life, 10);
}

#[test]
fn test_same_seed_same_labels() {
    let portfolio = mixed_portfolio();
    let pipeline = AuditPipeline::new(config()).unwrap();
    let first = pipeline.run(&portfolio).unwrap();
    let second = pipeline.run(&portfolio).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.machinery, second.machinery);
    assert_eq!(first.real_estate, second.real_estate);
}

#[test]
fn test_parallel_run_matches_sequential() {
    let portfolio = mixed_portfolio();
    let sequential = AuditPipeline::new(config()).unwrap().run(&portfolio).unwrap();
    let mut parallel_config = config();
    parallel_config.parallel_classes = true;
    let parallel = AuditPipeline::new(parallel_config).unwrap().run(&portfolio).unwrap();

    assert_eq!(sequential.machinery, parallel.machinery);
    assert_eq!(sequential.real_estate, parallel.real_estate);
    assert_eq!(sequential.intangibles, parallel.intangibles);
    assert_eq!(sequential.other_assets, parallel.other_assets);
}

#[test]
fn test_shared_reference_across_classes() {
    let report = AuditPipeline::new(config()).unwrap().run(&mixed_portfolio()).unwrap();
    assert_eq!(report.reference, Utc.with_ymd_and_hms(2025, 9, 1, 9, 30, 0).unwrap());
    let recent = &report.other_assets.records[1];
    assert_eq!(recent.metrics.days_since_registration, 7);
    assert!(!recent.metrics.is_stale);
}

#[test]
fn test_source_export_round_trip() {
    let json = r#"{
        "maquinarias": [
            {"id_equipo": "EQ-1000", "fecha_adquisicion": "2019-02-01", "valor_adquisicion": 250000.5,
             "vida_util_anios": 8, "fecha_fin_vida_util": "2027-01-30"},
            {"id_equipo": "EQ-1001", "fecha_adquisicion": "sin fecha", "valor_adquisicion": "???",
             "vida_util_anios": 12}
        ],
        "otros_activos": [
            {"id_activo": "OA-1000", "monto": "abc", "moneda": "USD", "fecha_registro": "2025-08-01"}
        ]
    }"#;
    let portfolio: Portfolio = serde_json::from_str(json).unwrap();
    let report = AuditPipeline::new(config()).unwrap().run(&portfolio).unwrap();

    assert_eq!(report.machinery.len(), 2);
    assert_eq!(report.machinery.coercions.unparseable_dates, 1);
    assert_eq!(report.machinery.coercions.unparseable_amounts, 1);
    let coerced = &report.machinery.records[1].metrics;
    assert_eq!(coerced.acquisition_date, date(2020, 1, 1));
    assert_eq!(coerced.acquisition_value, 0.0);
    assert_eq!(report.other_assets.records[0].metrics.amount, 0.0);

    let text = serde_json::to_string(&report).unwrap();
    let back: asset_audit_core::AuditReport = serde_json::from_str(&text).unwrap();
    assert_eq!(back.record_count(), 3);
    assert_eq!(back.run_id, report.run_id);
}

fn same_age_property(i: usize, value: f64, surface: Numeric) -> RealEstateRecord {
    RealEstateRecord {
        id: format!("INM-{}", 2000 + i),
        property_type: "Oficina".to_string(),
        address: String::new(),
        location: "CABA".to_string(),
        status: "Operativo".to_string(),
        acquisition_date: DateField::Valid(date(2010, 3, 10)),
        acquisition_value: Numeric::Value(value),
        surface_area: surface,
        end_of_life_date: DateField::Valid(date(2085, 3, 10)),
    }
}

/// `n - 1` near-identical properties plus one at ten times their value.
fn property_batch_with_extreme(n: usize, surface: impl Fn(usize) -> Numeric) -> Vec<RealEstateRecord> {
    let mut batch: Vec<RealEstateRecord> = (0..n - 1)
        .map(|i| same_age_property(i, 1_000_000.0 + i as f64 * 100.0, surface(i)))
        .collect();
    batch.push(same_age_property(n - 1, 10_000_000.0, surface(n - 1)));
    batch
}

fn audit_real_estate(config: AuditConfig, batch: Vec<RealEstateRecord>) -> Vec<AuditOutcome> {
    let report = AuditPipeline::new(config)
        .unwrap()
        .run(&Portfolio {
            real_estate: batch,
            ..Default::default()
        })
        .unwrap();
    report.real_estate.records.into_iter().map(|a| a.outcome).collect()
}

#[test]
fn test_real_estate_uses_its_own_threshold() {
    // a single extreme among 9 values scores just under sqrt(8) ~ 2.83
    let batch = property_batch_with_extreme(9, |_| Numeric::Value(250.0));
    let outcomes = audit_real_estate(config(), batch.clone());

    let extreme = outcomes[8].signals().unwrap();
    assert!(extreme.deviation_score > 2.5 && extreme.deviation_score < 3.0);
    assert!(!extreme.is_statistical_outlier, "real estate tests |z| > 3.0");
    assert!(extreme.is_model_outlier);
    assert_eq!(outcomes[8].verdict(), Some(Verdict::RealEstate(RealEstateVerdict::ModelOnly)));
    for outcome in &outcomes[..8] {
        assert_eq!(outcome.verdict(), Some(Verdict::RealEstate(RealEstateVerdict::Normal)));
        assert_eq!(outcome.verdict().unwrap().label(), "Normal");
    }

    let mut lowered = config();
    lowered.real_estate.threshold = 2.5;
    let outcomes = audit_real_estate(lowered, batch);
    assert_eq!(outcomes[8].verdict(), Some(Verdict::RealEstate(RealEstateVerdict::Both)));
    assert_eq!(outcomes[8].verdict().unwrap().label(), "both");
}

#[test]
fn test_real_estate_both_flagged_above_threshold() {
    // sqrt(11) ~ 3.32 clears the real estate threshold
    let outcomes = audit_real_estate(
        config(),
        property_batch_with_extreme(12, |i| Numeric::Value(200.0 + i as f64)),
    );
    assert_eq!(outcomes[11].verdict(), Some(Verdict::RealEstate(RealEstateVerdict::Both)));
    for outcome in &outcomes[..11] {
        assert!(!outcome.signals().unwrap().is_statistical_outlier);
        assert_ne!(outcome.verdict(), Some(Verdict::RealEstate(RealEstateVerdict::Both)));
    }
}

#[test]
fn test_unreadable_surface_fails_model_closed() {
    let batch = property_batch_with_extreme(12, |_| Numeric::Invalid("s/d".to_string()));
    let outcomes = audit_real_estate(config(), batch);

    assert_eq!(outcomes.len(), 12);
    for outcome in &outcomes {
        assert!(!outcome.signals().unwrap().is_model_outlier);
    }
    assert_eq!(
        outcomes[11].verdict(),
        Some(Verdict::RealEstate(RealEstateVerdict::StatisticalOnly))
    );
}
