use std::error::Error;

use ic50::chem::{parse_smiles, MolecularDescriptors};
use ic50::config::{EmbeddingConfig, ParseFailurePolicy};
use ic50::data_io::Frame;
use ic50::features::FeatureSpace;
use ic50::models::{GbdtRegressor, RegressionReport};
use ic50::preprocess::Preprocessor;

#[test]
fn integration_smiles_and_descriptors() -> Result<(), Box<dyn Error>> {
    // water: one heavy atom, two implicit hydrogens
    let water = parse_smiles("O")?;
    assert_eq!(water.atom_count(), 1);
    let d = MolecularDescriptors::compute(&water);
    assert!((d.mol_wt - 18.015).abs() < 0.01, "water MW mismatch: got {}", d.mol_wt);
    assert_eq!(d.h_bond_donors, 1);
    Ok(())
}

#[test]
fn integration_csv_to_boosted_trees() -> Result<(), Box<dyn Error>> {
    let csv_data = "\
Molecule ChEMBL ID,Assay ChEMBL ID,Document ChEMBL ID,pIC50,Smiles
CHEMBL1,CHEMBL10,CHEMBL100,5.0,CCO
CHEMBL2,CHEMBL10,CHEMBL100,5.1,CCCO
CHEMBL3,CHEMBL10,CHEMBL100,5.2,CCCCO
CHEMBL4,CHEMBL11,CHEMBL100,8.0,c1ccccc1
CHEMBL5,CHEMBL11,CHEMBL100,8.1,Cc1ccccc1
CHEMBL6,CHEMBL11,CHEMBL100,8.2,CCc1ccccc1
";
    let table = Preprocessor::new(2).process_train(Frame::from_reader(csv_data.as_bytes())?)?;
    assert_eq!(table.len(), 6);
    assert_eq!(table.records()[3].assay, Some(11));

    let space = FeatureSpace::fit(&table, &EmbeddingConfig { radius: 2, fold_bits: 64 }, ParseFailurePolicy::Fail)?;
    let rows: Vec<Vec<f32>> = table.iter().map(|r| space.featurize(r).standardized).collect();
    let targets: Vec<f32> = table.iter().map(|r| r.pic50.unwrap_or_default() as f32).collect();
    assert!(rows.iter().all(|r| r.len() == space.flat_dim()));

    let params = ic50::config::GbdtSection { n_estimators: 30, learning_rate: 0.3, max_depth: 3 };
    let mut model = GbdtRegressor::new(&params, space.flat_dim());
    model.fit(&rows, &targets)?;
    let report = RegressionReport::compute(&model.predict(&rows)?, &targets)?;
    assert!(report.rmse < 0.5, "training rmse too high: {}", report.rmse);
    Ok(())
}
