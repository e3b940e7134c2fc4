use std::fs;

use pcg_md::{attach_prices, load_universe, parse_prices_file, realized_volatility};

#[test]
fn universe_and_prices_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let universe = dir.path().join("universe.yaml");
    let prices = dir.path().join("prices.csv");

    fs::write(
        &universe,
        "- ticker: AAA\n  score: 80\n- ticker: BBB\n  score: 60\n  volatility: 18\n",
    )
    .unwrap();

    let mut csv = String::from("symbol,date,close\n");
    for day in 1..=20 {
        csv.push_str(&format!("AAA,2024-01-{day:02},{}\n", 100.0 + day as f64));
        csv.push_str(&format!("BBB,2024-01-{day:02},{}\n", 50.0 - (day % 3) as f64));
    }
    fs::write(&prices, csv).unwrap();

    let history = parse_prices_file(&prices).unwrap();
    let assets = attach_prices(load_universe(&universe).unwrap(), &history);

    assert_eq!(assets.len(), 2);
    for a in &assets {
        assert_eq!(a.prices.len(), 20);
        assert!(a.has_date_index());
        assert!(a.validate().is_ok());
    }

    let vol = realized_volatility(&assets[1].closes(), None).unwrap();
    assert!(vol > 0.0);
}

#[test]
fn missing_universe_file_names_the_path() {
    let err = load_universe(std::path::Path::new("/no/such/universe.yaml")).unwrap_err();
    assert!(format!("{err:#}").contains("universe.yaml"));
}
