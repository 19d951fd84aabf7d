use std::fs;
use std::path::Path;

use ic50::cli::CpuBackend;
use ic50::config::{ModelKind, TrainConfig};
use ic50::data_io::Frame;

const SMILES: [&str; 12] = [
    "CCO",
    "CCCO",
    "CC(=O)O",
    "c1ccccc1",
    "Cc1ccccc1",
    "Oc1ccccc1",
    "CC(=O)Oc1ccccc1C(=O)O",
    "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
    "CCN(CC)CC",
    "C1CCCCC1",
    "NC(=O)c1ccccc1",
    "CCOC(=O)C",
];

fn write_inputs(dir: &Path) {
    let mut train = String::from(
        "Molecule ChEMBL ID,Standard Type,Standard Value,pChEMBL Value,Assay ChEMBL ID,Document ChEMBL ID,IC50_nM,pIC50,Smiles\n",
    );
    for (i, smiles) in SMILES.iter().enumerate() {
        let pic50 = 5.0 + (i % 4) as f64 * 0.75;
        let ic50 = 10f64.powf(9.0 - pic50);
        train.push_str(&format!(
            "CHEMBL{},IC50,{ic50},{pic50},CHEMBL{},CHEMBL{},{ic50},{pic50},\"{smiles}\"\n",
            1000 + i,
            200 + i % 3,
            300 + i % 2
        ));
    }
    // one structure that does not parse
    train.push_str("CHEMBL9999,IC50,100,7,CHEMBL200,CHEMBL300,100,7,C1CC\n");
    fs::write(dir.join("train.csv"), train).unwrap();

    let test = "ID,Smiles\nTEST_000,CCCCO\nTEST_001,c1ccncc1\nTEST_002,not-a-smiles\n";
    fs::write(dir.join("test.csv"), test).unwrap();
    fs::write(dir.join("sample_submission.csv"), "ID,IC50_nM\nTEST_000,0\nTEST_001,0\nTEST_002,0\n").unwrap();
}

fn config(root: &Path, model: ModelKind) -> TrainConfig {
    let text = format!(
        r#"
        run_name = "e2e"
        data_dir = "{data}"
        model_dir = "{models}"
        submission_dir = "{subs}"
        model = "{model}"
        epochs = 2
        batch_size = 4
        lr = 0.001
        valid_ratio = 0.25
        tracking = true

        [embedding]
        radius = 2
        fold_bits = 32

        [mlp]
        layer_dims = [16, 8]
        embed_dim = 4
        dropout = 0.1

        [gbdt]
        n_estimators = 10
        max_depth = 3
        "#,
        data = root.join("data").display(),
        models = root.join("models").display(),
        subs = root.join("subs").display(),
    );
    TrainConfig::from_toml_str(&text).unwrap()
}

fn check_submission(path: &Path) {
    let frame = Frame::from_path(path).unwrap();
    assert_eq!(frame.len(), 3);
    assert_eq!(frame.get(1, "ID"), Some("TEST_001"));
    for row in 0..3 {
        let v: f64 = frame.get(row, "IC50_nM").unwrap().parse().unwrap();
        assert!(v.is_finite() && v > 0.0, "bad prediction {v}");
    }
}

#[test]
fn mlp_holdout_run_writes_checkpoint_metrics_and_submission() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("data")).unwrap();
    write_inputs(&root.path().join("data"));
    let cfg = config(root.path(), ModelKind::Mlp);

    let report = ic50::pipeline::run::<CpuBackend>(&cfg, Default::default()).unwrap();

    assert_eq!(report.folds.len(), 1);
    assert_eq!(report.n_predictions, 3);
    assert!(root.path().join("models/e2e.bin").exists());
    let metrics = fs::read_to_string(root.path().join("models/e2e.metrics.jsonl")).unwrap();
    assert_eq!(metrics.lines().count(), 2);
    assert!(report.folds[0].checkpoints_written >= 1);
    assert_eq!(report.submission, root.path().join("subs/e2e.csv"));
    check_submission(&report.submission);
}

#[test]
fn gbdt_k_fold_run_averages_folds() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("data")).unwrap();
    write_inputs(&root.path().join("data"));
    let mut cfg = config(root.path(), ModelKind::Gbdt);
    cfg.k_fold = Some(3);

    let report = ic50::pipeline::run::<CpuBackend>(&cfg, Default::default()).unwrap();

    assert_eq!(report.folds.len(), 3);
    for i in 0..3 {
        assert!(root.path().join(format!("models/e2e-fold{i}.gbdt")).exists());
        assert!(report.folds[i].valid.is_some());
    }
    check_submission(&root.path().join("subs/e2e.csv"));
}

#[test]
fn skip_policy_drops_unparseable_training_rows() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("data")).unwrap();
    write_inputs(&root.path().join("data"));
    let mut cfg = config(root.path(), ModelKind::Gbdt);
    cfg.on_parse_failure = ic50::ParseFailurePolicy::Fail;
    assert!(ic50::pipeline::run::<CpuBackend>(&cfg, Default::default()).is_err());

    cfg.on_parse_failure = ic50::ParseFailurePolicy::Skip;
    let report = ic50::pipeline::run::<CpuBackend>(&cfg, Default::default()).unwrap();
    // test rows are never dropped
    assert_eq!(report.n_predictions, 3);
}
