use std::sync::Arc;
use tempfile::tempdir;
use tickvault_core::common::{Adjustment, Period, Symbol};
use tickvault_core::market::error::FetchError;
use tickvault_core::store::entity::SeriesKey;
use tickvault_core::store::port::SeriesStore;
use tickvault_core::test_utils::{ScriptedFetchAdapter, base_time, sample_bar, sample_tick};
use tickvault_scheduler::collector::{Collector, RefreshRequest, RefreshStatus};
use tickvault_scheduler::registry::{FetchTarget, InFlightRegistry};
use tickvault_store::csv_store::CsvSeriesStore;

fn symbol() -> Symbol {
    Symbol::parse("600689.SH").unwrap()
}

#[tokio::test]
async fn test_refresh_fetches_periods_and_realtime() {
    let tmp = tempdir().unwrap();
    let store = Arc::new(CsvSeriesStore::new(tmp.path()).unwrap());
    let adapter = Arc::new(ScriptedFetchAdapter::new());
    let s = symbol();
    let daily: Vec<_> = (0..8u32)
        .map(|i| sample_bar(&s, Period::Day1, i, 10.0 + f64::from(i)))
        .collect();
    adapter.set_kline(&s, Period::Day1, Ok(daily.clone()));
    adapter.set_kline(
        &s,
        Period::Minute5,
        Ok(vec![sample_bar(&s, Period::Minute5, 0, 10.0)]),
    );
    adapter.set_kline(&s, Period::Minute1, Err(FetchError::Empty));

    let collector = Collector::new(adapter.clone(), store.clone(), InFlightRegistry::new());
    let mut request = RefreshRequest::new(s.clone());
    request.periods = vec![Period::Day1, Period::Minute1, Period::Minute5, Period::Day1];
    request.preview_limit = 3;

    let report = collector.refresh_symbol(request).await;
    assert_eq!(report.symbol, "600689.SH");
    assert!(!report.success);
    let periods: Vec<_> = report.periods.iter().map(|p| p.period.as_str()).collect();
    assert_eq!(periods, vec!["1m", "5m", "1d"]);

    let minute = &report.periods[0];
    assert_eq!(minute.status, RefreshStatus::Failed);
    assert_eq!(minute.total_rows, 0);
    assert!(minute.error.as_deref().unwrap().contains("Empty"));

    let day = &report.periods[2];
    assert_eq!(day.status, RefreshStatus::Updated);
    assert_eq!(day.file, "600689_SH_1d_front_kline.csv");
    assert_eq!(day.merge.unwrap().appended, 8);
    assert_eq!(day.total_rows, 8);
    assert_eq!(day.preview, daily[5..].to_vec());

    let realtime = report.realtime.unwrap();
    assert_eq!(realtime.status, RefreshStatus::Updated);
    assert_eq!(realtime.file, "600689_SH_real_time_price.json");
    let saved = store.latest_tick(&s).await.unwrap().unwrap();
    let tick = realtime.tick.unwrap();
    assert_eq!(saved.symbol, tick.symbol);
    assert_eq!(saved.last_price, tick.last_price);
    assert_eq!(adapter.kline_calls(&s, Period::Day1), 1);
}

#[tokio::test]
async fn test_busy_targets_are_reported_without_waiting() {
    let tmp = tempdir().unwrap();
    let store = Arc::new(CsvSeriesStore::new(tmp.path()).unwrap());
    let adapter = Arc::new(ScriptedFetchAdapter::new());
    let registry = InFlightRegistry::new();
    let s = symbol();
    let key = SeriesKey::new(s.clone(), Period::Day1, Adjustment::Back);

    // 已有数据与快照
    store
        .merge(&key, &[sample_bar(&s, Period::Day1, 0, 10.0)])
        .await
        .unwrap();
    let previous = sample_tick(&s, base_time(), 10.1);
    store.save_tick(&previous).await.unwrap();

    let _kline = registry.try_claim(FetchTarget::Kline(key.clone())).unwrap();
    let _tick = registry.try_claim(FetchTarget::Realtime(s.clone())).unwrap();

    let collector = Collector::new(adapter.clone(), store, registry.clone());
    let mut request = RefreshRequest::new(s.clone());
    request.adjustment = Adjustment::Back;
    request.periods = vec![Period::Day1];

    let report = collector.refresh_symbol(request).await;
    assert!(report.success);
    assert_eq!(report.periods[0].status, RefreshStatus::Busy);
    assert_eq!(report.periods[0].total_rows, 1);
    assert_eq!(report.periods[0].file, "600689_SH_1d_back_kline.csv");
    let realtime = report.realtime.unwrap();
    assert_eq!(realtime.status, RefreshStatus::Busy);
    assert!(realtime.error.is_none());
    assert_eq!(realtime.tick, Some(previous));

    assert_eq!(adapter.total_kline_calls(), 0);
    assert_eq!(adapter.realtime_calls(), 0);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_realtime_only_refresh() {
    let tmp = tempdir().unwrap();
    let store = Arc::new(CsvSeriesStore::new(tmp.path()).unwrap());
    let adapter = Arc::new(ScriptedFetchAdapter::new());
    adapter.set_realtime(Err(FetchError::Network("timeout".into())));
    let registry = InFlightRegistry::new();

    let collector = Collector::new(adapter.clone(), store, registry.clone());
    let mut request = RefreshRequest::new(symbol());
    request.periods.clear();

    let report = collector.refresh_symbol(request).await;
    assert!(report.periods.is_empty());
    assert!(!report.success);
    let realtime = report.realtime.unwrap();
    assert_eq!(realtime.status, RefreshStatus::Failed);
    assert!(realtime.tick.is_none());
    assert!(realtime.error.unwrap().contains("timeout"));
    assert_eq!(adapter.total_kline_calls(), 0);
    assert!(registry.is_empty());
}
