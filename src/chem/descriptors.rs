// src/chem/descriptors.rs
//! Dense physicochemical descriptors used next to the Morgan embedding.
//!
//! The set is deliberately small and graph-only (no 3D, no charges model):
//! - **MolWt** – average molecular weight including implicit hydrogens
//! - **HeavyAtoms** / **Heteroatoms**
//! - **NumHDonors** – N/O atoms carrying at least one hydrogen
//! - **NumHAcceptors** – N and O atoms (Lipinski count)
//! - **AromaticAtoms**, **RingAtoms**
//! - **RotatableBonds** – non-ring single bonds between two non-terminal heavy atoms
//! - **FormalCharge** – sum over atoms

use super::element;
use super::smiles::{BondOrder, Molecule};

/// Length of [`MolecularDescriptors::to_vec`].
pub const N_DESCRIPTORS: usize = 9;

/// Descriptor names in the order used by [`MolecularDescriptors::to_vec`].
pub const DESCRIPTOR_NAMES: [&str; N_DESCRIPTORS] = [
    "mol_wt",
    "heavy_atoms",
    "heteroatoms",
    "h_bond_donors",
    "h_bond_acceptors",
    "aromatic_atoms",
    "ring_atoms",
    "rotatable_bonds",
    "formal_charge",
];

/// Container for the graph descriptors of one molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct MolecularDescriptors {
    /// Molecular weight (Daltons)
    pub mol_wt: f64,
    /// Atoms heavier than hydrogen
    pub heavy_atoms: usize,
    /// Heavy atoms other than carbon
    pub heteroatoms: usize,
    /// Number of hydrogen bond donors (OH + NH)
    pub h_bond_donors: usize,
    /// Number of hydrogen bond acceptors (N + O)
    pub h_bond_acceptors: usize,
    /// Atoms written aromatic
    pub aromatic_atoms: usize,
    /// Atoms on at least one ring
    pub ring_atoms: usize,
    /// Rotatable bonds
    pub rotatable_bonds: usize,
    /// Net formal charge
    pub formal_charge: i32,
}

impl MolecularDescriptors {
    /// Compute every descriptor for a parsed molecule.
    ///
    /// ```
    /// use ic50::chem::{parse_smiles, MolecularDescriptors};
    ///
    /// let d = MolecularDescriptors::compute(&parse_smiles("CCO").unwrap()); // ethanol
    /// assert!((d.mol_wt - 46.07).abs() < 0.05);
    /// assert_eq!(d.h_bond_donors, 1);
    /// assert_eq!(d.h_bond_acceptors, 1);
    /// ```
    pub fn compute(mol: &Molecule) -> Self {
        let hydrogen = element("H").map(|e| e.atomic_weight).unwrap_or(1.008);
        let mut out = MolecularDescriptors {
            mol_wt: 0.0,
            heavy_atoms: 0,
            heteroatoms: 0,
            h_bond_donors: 0,
            h_bond_acceptors: 0,
            aromatic_atoms: 0,
            ring_atoms: 0,
            rotatable_bonds: 0,
            formal_charge: 0,
        };

        for (idx, atom) in mol.atoms().iter().enumerate() {
            let weight = element(atom.symbol).map(|e| e.atomic_weight).unwrap_or(0.0);
            out.mol_wt += weight + f64::from(atom.total_h()) * hydrogen;
            out.formal_charge += i32::from(atom.charge);

            if atom.is_heavy() {
                out.heavy_atoms += 1;
                if atom.atomic_number != 6 {
                    out.heteroatoms += 1;
                }
            }
            if matches!(atom.symbol, "N" | "O") {
                out.h_bond_acceptors += 1;
                if atom.total_h() > 0 {
                    out.h_bond_donors += 1;
                }
            }
            if atom.aromatic {
                out.aromatic_atoms += 1;
            }
            if mol.is_ring_atom(idx) {
                out.ring_atoms += 1;
            }
        }

        let heavy_degree = |i: usize| {
            mol.neighbors(i)
                .iter()
                .filter(|&&(n, _)| mol.atoms()[n].is_heavy())
                .count()
        };
        out.rotatable_bonds = mol
            .bonds()
            .iter()
            .enumerate()
            .filter(|(idx, bond)| {
                bond.order == BondOrder::Single
                    && !mol.is_ring_bond(*idx)
                    && mol.atoms()[bond.a].is_heavy()
                    && mol.atoms()[bond.b].is_heavy()
                    && heavy_degree(bond.a) > 1
                    && heavy_degree(bond.b) > 1
            })
            .count();

        out
    }

    /// Descriptors as a fixed-order `f32` vector (see [`DESCRIPTOR_NAMES`]).
    pub fn to_vec(&self) -> [f32; N_DESCRIPTORS] {
        [
            self.mol_wt as f32,
            self.heavy_atoms as f32,
            self.heteroatoms as f32,
            self.h_bond_donors as f32,
            self.h_bond_acceptors as f32,
            self.aromatic_atoms as f32,
            self.ring_atoms as f32,
            self.rotatable_bonds as f32,
            self.formal_charge as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::parse_smiles;

    #[test]
    fn aspirin() {
        let d = MolecularDescriptors::compute(&parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap());
        assert!((d.mol_wt - 180.16).abs() < 0.1);
        assert_eq!(d.heavy_atoms, 13);
        assert_eq!(d.heteroatoms, 4);
        assert_eq!(d.h_bond_donors, 1);
        assert_eq!(d.h_bond_acceptors, 4);
        assert_eq!(d.aromatic_atoms, 6);
        assert_eq!(d.ring_atoms, 6);
        assert_eq!(d.rotatable_bonds, 3);
    }

    #[test]
    fn caffeine() {
        let d = MolecularDescriptors::compute(&parse_smiles("CN1C=NC2=C1C(=O)N(C(=O)N2C)C").unwrap());
        assert!((d.mol_wt - 194.19).abs() < 0.1);
        assert_eq!(d.h_bond_donors, 0);
        assert_eq!(d.ring_atoms, 9);
        assert_eq!(d.rotatable_bonds, 0);
    }

    #[test]
    fn substituted_ring_nitrogen_is_not_a_donor() {
        let d = MolecularDescriptors::compute(&parse_smiles("Cn1ccnc1").unwrap());
        assert!((d.mol_wt - 82.11).abs() < 0.1);
        assert_eq!(d.h_bond_donors, 0);
        assert_eq!(d.h_bond_acceptors, 2);

        let thiophene = MolecularDescriptors::compute(&parse_smiles("c1ccsc1").unwrap());
        assert!((thiophene.mol_wt - 84.14).abs() < 0.1);
    }

    #[test]
    fn charges_are_summed() {
        let d = MolecularDescriptors::compute(&parse_smiles("[NH4+].[Cl-]").unwrap());
        assert_eq!(d.formal_charge, 0);
        assert_eq!(d.to_vec().len(), N_DESCRIPTORS);
    }
}
