mod common;

#[test]
fn test_generate_commands_csv() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("generated.csv");
    common::generate_commands_csv(&output_path, 3, 10, 5).expect("Failed to generate CSV");

    let content = std::fs::read_to_string(&output_path).expect("Failed to read file");
    // Header + 3 opens + 5 transfers
    assert_eq!(content.lines().count(), 9);
}

#[test]
fn test_generated_transfers_never_self_target() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("generated.csv");
    common::generate_commands_csv(&output_path, 4, 10, 50).expect("Failed to generate CSV");

    let mut reader = csv::Reader::from_path(&output_path).expect("Failed to open CSV");
    let mut transfers = 0;
    for result in reader.records() {
        let record = result.expect("Failed to read record");
        if &record[0] == "transfer" {
            let from: usize = record[3].parse().unwrap();
            let to: usize = record[4].parse().unwrap();
            assert!((1..=4).contains(&from));
            assert!((1..=4).contains(&to));
            assert_ne!(from, to);
            transfers += 1;
        }
    }
    assert_eq!(transfers, 50);
}
