// src/chem/morgan.rs
//! Morgan (ECFP-style) circular environments with per-radius occurrence counts.
//!
//! Every atom starts with an identifier hashed from its local invariants.
//! Each iteration folds the sorted `(bond code, neighbour identifier)` pairs
//! into a new identifier, so the identifier at iteration `r` describes the
//! environment of radius `r` around the atom. An environment is emitted once
//! per distinct bond set: when two atoms grow into exactly the same set of
//! bonds only the first (in sorted order) is kept, and an atom whose
//! environment stops growing is retired.
//!
//! Hashing uses a fixed 32-bit combine, so keys are stable across runs,
//! platforms and compiler versions (the vocabulary depends on that).
//!
//! ```
//! use ic50::chem::{morgan_environments, parse_smiles};
//!
//! let mol = parse_smiles("CCO").unwrap();
//! let envs = morgan_environments(&mol, 2);
//! // three atoms at radius 0, plus the larger environments that are distinct
//! assert_eq!(envs.at_radius(0).count(), 3);
//! assert!(envs.len() > 3);
//! ```

use std::collections::{BTreeMap, HashSet};

use super::smiles::Molecule;

/// Radius used when nothing else is configured: radii `0..=3`, four columns.
pub const DEFAULT_RADIUS: usize = 3;

/// Largest radius a configuration may ask for.
pub const MAX_RADIUS: usize = 8;

/// One emitted environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Hashed identifier of the environment.
    pub key: u32,
    /// Radius (iteration) at which it was produced.
    pub radius: usize,
    /// Central atom.
    pub center: usize,
}

/// All environments of one molecule, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorganEnvironments {
    radius: usize,
    environments: Vec<Environment>,
}

impl MorganEnvironments {
    /// Maximum radius used during enumeration.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Number of emitted environments.
    pub fn len(&self) -> usize {
        self.environments.len()
    }

    /// No environments (only for molecules without atoms).
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Iterate over all environments.
    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.environments.iter()
    }

    /// Environments emitted at a given radius.
    pub fn at_radius(&self, radius: usize) -> impl Iterator<Item = &Environment> {
        self.environments.iter().filter(move |e| e.radius == radius)
    }

    /// Occurrence count per `(key, radius)`.
    pub fn counts(&self) -> BTreeMap<(u32, usize), u32> {
        let mut counts = BTreeMap::new();
        for env in &self.environments {
            *counts.entry((env.key, env.radius)).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct keys, any radius.
    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.environments.iter().map(|e| e.key)
    }

    /// Counts folded into `n_bits` buckets (`key % n_bits`).
    pub fn folded_counts(&self, n_bits: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; n_bits];
        if n_bits == 0 {
            return out;
        }
        for env in &self.environments {
            out[env.key as usize % n_bits] += 1.0;
        }
        out
    }
}

/// Enumerate Morgan environments up to `radius` (inclusive).
pub fn morgan_environments(mol: &Molecule, radius: usize) -> MorganEnvironments {
    let n_atoms = mol.atom_count();
    let words = mol.bond_count().div_ceil(64).max(1);

    let mut ids: Vec<u32> = (0..n_atoms).map(|i| atom_invariant(mol, i)).collect();
    let mut neighborhoods: Vec<Vec<u64>> = vec![vec![0u64; words]; n_atoms];
    let mut retired = vec![false; n_atoms];
    let mut seen: HashSet<Vec<u64>> = HashSet::new();

    let mut environments: Vec<Environment> = ids
        .iter()
        .enumerate()
        .map(|(center, &key)| Environment { key, radius: 0, center })
        .collect();

    for r in 1..=radius {
        let mut next_ids = ids.clone();
        let mut next_neighborhoods = neighborhoods.clone();
        let mut candidates: Vec<(Vec<u64>, u32, usize)> = Vec::new();

        for atom in 0..n_atoms {
            if retired[atom] {
                continue;
            }
            let mut pairs: Vec<(u32, u32)> = mol
                .neighbors(atom)
                .iter()
                .map(|&(nbr, bond)| (mol.bonds()[bond].order.code(), ids[nbr]))
                .collect();
            pairs.sort_unstable();

            let mut h = hash_combine(r as u32, ids[atom]);
            for (code, id) in pairs {
                h = hash_combine(h, code);
                h = hash_combine(h, id);
            }
            next_ids[atom] = h;

            let mut grown = neighborhoods[atom].clone();
            for &(nbr, bond) in mol.neighbors(atom) {
                grown[bond / 64] |= 1u64 << (bond % 64);
                for (w, word) in grown.iter_mut().enumerate() {
                    *word |= neighborhoods[nbr][w];
                }
            }
            next_neighborhoods[atom] = grown.clone();
            candidates.push((grown, h, atom));
        }

        candidates.sort();
        for (bonds, key, center) in candidates {
            if bonds.iter().all(|&w| w == 0) || !seen.insert(bonds) {
                retired[center] = true;
                continue;
            }
            environments.push(Environment { key, radius: r, center });
        }

        ids = next_ids;
        neighborhoods = next_neighborhoods;
    }

    MorganEnvironments { radius, environments }
}

/// Initial identifier from ECFP-style invariants: heavy degree, atomic
/// number, isotope, total hydrogens, formal charge, ring membership.
fn atom_invariant(mol: &Molecule, atom: usize) -> u32 {
    let a = &mol.atoms()[atom];
    let heavy_degree = mol
        .neighbors(atom)
        .iter()
        .filter(|&&(nbr, _)| mol.atoms()[nbr].is_heavy())
        .count() as u32;
    let invariants = [
        heavy_degree,
        u32::from(a.atomic_number),
        a.isotope.map(u32::from).unwrap_or(0),
        u32::from(a.total_h()),
        a.charge as i32 as u32,
        u32::from(mol.is_ring_atom(atom)),
    ];
    invariants.iter().fold(0u32, |seed, &v| hash_combine(seed, v))
}

fn hash_combine(seed: u32, value: u32) -> u32 {
    seed ^ value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::parse_smiles;

    #[test]
    fn keys_are_deterministic() {
        let a = morgan_environments(&parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap(), 3);
        let b = morgan_environments(&parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn symmetric_atoms_share_radius_zero_key() {
        let envs = morgan_environments(&parse_smiles("CCC").unwrap(), 1);
        let r0: Vec<u32> = envs.at_radius(0).map(|e| e.key).collect();
        assert_eq!(r0[0], r0[2]);
        assert_ne!(r0[0], r0[1]);
        let counts = envs.counts();
        assert_eq!(counts.get(&(r0[0], 0)), Some(&2));
    }

    #[test]
    fn duplicate_environments_are_dropped() {
        // In ethane both radius-1 environments cover the single bond.
        let envs = morgan_environments(&parse_smiles("CC").unwrap(), 2);
        assert_eq!(envs.at_radius(0).count(), 2);
        assert_eq!(envs.at_radius(1).count(), 1);
        assert_eq!(envs.at_radius(2).count(), 0);
    }

    #[test]
    fn benzene_has_one_key_per_radius() {
        let envs = morgan_environments(&parse_smiles("c1ccccc1").unwrap(), 3);
        let counts = envs.counts();
        assert_eq!(counts.get(&(envs.at_radius(0).next().unwrap().key, 0)), Some(&6));
        for r in 0..=3usize {
            let keys: HashSet<u32> = envs.at_radius(r).map(|e| e.key).collect();
            assert!(keys.len() <= 1, "radius {r} produced {} keys", keys.len());
        }
    }

    #[test]
    fn folding_preserves_total_count() {
        let envs = morgan_environments(&parse_smiles("CN1C=NC2=C1C(=O)N(C(=O)N2C)C").unwrap(), 3);
        let folded = envs.folded_counts(64);
        assert_eq!(folded.iter().sum::<f32>() as usize, envs.len());
        assert!(envs.folded_counts(0).is_empty());
    }
}
