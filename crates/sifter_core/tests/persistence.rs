use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use sifter_core::{
    update, CreatedJob, Effect, FilterField, JobStatus, Msg, PersistedRecord, ResultRow, RowKey,
    RunMode, SifterState,
};

fn init_logging() {
    engine_logging::initialize_for_tests();
}

fn populated_state() -> SifterState {
    let fields = [
        FilterField::FromDate("2026-02-01".into()),
        FilterField::ToDate("2026-02-28".into()),
        FilterField::Tickers("AAPL MSFT".into()),
        FilterField::MinPrice(Some(10.0)),
        FilterField::MinVolume(None),
        FilterField::Metric("gap_pct".into()),
        FilterField::RunMode(RunMode::Job),
    ];
    let mut state = SifterState::new();
    for field in fields {
        state = update(state, Msg::SetField(field)).0;
    }
    let (state, _) = update(state, Msg::Select(RowKey::new("MSFT", "2026-02-03")));

    let (state, effects) = update(state, Msg::RunQuery);
    let generation = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::RunQuery { generation, .. } => Some(*generation),
            _ => None,
        })
        .expect("run query effect");
    let (state, _) = update(
        state,
        Msg::QueryCompleted {
            generation,
            result: Ok(vec![ResultRow {
                ticker: "AAPL".into(),
                date: "2026-02-02".into(),
                values: BTreeMap::new(),
            }]),
        },
    );

    let (state, effects) = update(state, Msg::StartJob);
    let generation = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::CreateJob { generation, .. } => Some(*generation),
            _ => None,
        })
        .expect("create job effect");
    update(
        state,
        Msg::JobCreated {
            generation,
            result: Ok(CreatedJob {
                request_id: "J1".into(),
                status: JobStatus::Running.code(),
            }),
        },
    )
    .0
}

#[test]
fn record_round_trip_restores_filters_and_job_bookkeeping() {
    init_logging();
    let original = populated_state();
    let record = original.persisted();

    let text = ron::ser::to_string_pretty(&record, ron::ser::PrettyConfig::new()).unwrap();
    let reloaded: PersistedRecord = ron::from_str(&text).unwrap();
    assert_eq!(reloaded, record);

    let (fresh, _) = update(SifterState::new(), Msg::Restore(reloaded));
    let before = original.snapshot();
    let after = fresh.snapshot();

    assert_eq!(after.filters, before.filters);
    assert_eq!(after.selection, before.selection);
    assert_eq!(after.job.request_id, before.job.request_id);
    assert_eq!(after.job.status, before.job.status);
    assert_eq!(after.job.progress, before.job.progress);
    assert_eq!(after.job.message, before.job.message);

    assert_eq!(before.query.rows.len(), 1);
    assert!(after.query.rows.is_empty());
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    init_logging();
    let record: PersistedRecord = ron::from_str("(filters: (from_date: \"2026-02-01\"))").unwrap();

    assert_eq!(record.filters.from_date, "2026-02-01");
    assert_eq!(record.filters.metric, "change_pct");
    assert_eq!(record.filters.run_mode, RunMode::Quick);
    assert_eq!(record.request_id, None);
    assert_eq!(record.job_status, None);
}
