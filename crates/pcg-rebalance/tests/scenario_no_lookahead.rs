use chrono::{Duration, NaiveDate};
use pcg_allocation::AllocationMethod;
use pcg_rebalance::{JsonlSink, MemorySink, RebalanceSnapshot, Rebalancer, SnapshotSink};
use pcg_schemas::{Asset, PricePoint};

fn day(n: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, 1).unwrap() + Duration::days(n)
}

fn series(seed: f64, amp: f64, days: i64) -> Vec<PricePoint> {
    let mut px = 40.0 + seed;
    (0..days)
        .map(|t| {
            px *= 1.0 + amp * ((t as f64) * 0.7 + seed).sin();
            PricePoint::dated(day(t), px)
        })
        .collect()
}

fn universe(days: i64) -> Vec<Asset> {
    [("AAA", 85.0, 0.006), ("BBB", 70.0, 0.010), ("CCC", 55.0, 0.018), ("DDD", 45.0, 0.030)]
        .iter()
        .map(|(t, score, amp)| {
            Asset::new(*t, *t, *score)
                .with_volatility(20.0)
                .with_prices(series(*score, *amp, days))
        })
        .collect()
}

#[test]
fn appending_future_prices_does_not_change_past_snapshots() {
    let dates = [day(40), day(70), day(100)];
    let rebalancer = Rebalancer::default();

    let short = rebalancer
        .run(&universe(101), &dates, AllocationMethod::Hybrid, &mut MemorySink::new())
        .unwrap();

    // Same universe with 80 more days of (different-regime) history appended.
    let mut extended = universe(101);
    for (i, a) in extended.iter_mut().enumerate() {
        let last = a.prices.last().unwrap().close;
        for t in 101..181 {
            let shock = if (t + i as i64) % 2 == 0 { 1.08 } else { 0.93 };
            a.prices.push(PricePoint::dated(day(t), last * shock));
        }
    }
    let long = rebalancer
        .run(&extended, &dates, AllocationMethod::Hybrid, &mut MemorySink::new())
        .unwrap();

    assert_eq!(short, long);
}

#[test]
fn snapshots_are_chronological_and_persisted_in_order() {
    let dates = [day(30), day(60), day(90)];
    let mut sink = MemorySink::new();
    let returned = Rebalancer::default()
        .run(&universe(91), &dates, AllocationMethod::Erc, &mut sink)
        .unwrap();

    assert_eq!(sink.snapshots(), returned.as_slice());
    let seen: Vec<NaiveDate> = returned.iter().map(|s| s.date).collect();
    assert_eq!(seen, dates.to_vec());
    for s in &returned {
        let sum: f64 = s.allocation.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}

#[test]
fn jsonl_sink_appends_one_line_per_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("snapshots.jsonl");

    let mut sink = JsonlSink::new(&path).unwrap();
    let returned = Rebalancer::default()
        .run(&universe(91), &[day(45), day(90)], AllocationMethod::EqualWeight, &mut sink)
        .unwrap();
    assert_eq!(sink.written(), 2);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 2);

    let back = JsonlSink::read_all(&path).unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].id, returned[0].id);
    assert_eq!(back[1].date, day(90));
}

struct FailAfter {
    remaining: usize,
}

impl SnapshotSink for FailAfter {
    fn persist(&mut self, _snapshot: &RebalanceSnapshot) -> anyhow::Result<()> {
        if self.remaining == 0 {
            anyhow::bail!("disk full");
        }
        self.remaining -= 1;
        Ok(())
    }
}

#[test]
fn sink_failure_stops_the_run() {
    let err = Rebalancer::default()
        .run(
            &universe(91),
            &[day(30), day(60), day(90)],
            AllocationMethod::Erc,
            &mut FailAfter { remaining: 1 },
        )
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("disk full"), "{msg}");
    assert!(msg.contains(&day(60).to_string()), "{msg}");
}
