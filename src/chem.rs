//! Structure handling: SMILES graphs, Morgan environments and dense descriptors.
//!
//! Everything here works on the [`smiles::Molecule`] graph produced by
//! [`smiles::parse_smiles`]. The parser covers what the featurisers need
//! (organic subset, bracket atoms, branches, ring closures, explicit bond
//! symbols, disconnected components); stereo marks are accepted and ignored.
//!
//! - [`smiles`]: SMILES → molecular graph, implicit hydrogens, ring membership
//! - [`morgan`]: circular (Morgan/ECFP-style) environment enumeration
//! - [`descriptors`]: small physicochemical descriptor vector

pub mod descriptors;
pub mod morgan;
pub mod smiles;

use thiserror::Error;

pub use descriptors::{MolecularDescriptors, N_DESCRIPTORS};
pub use morgan::{morgan_environments, Environment, MorganEnvironments, DEFAULT_RADIUS, MAX_RADIUS};
pub use smiles::{parse_smiles, Atom, Bond, BondOrder, Molecule};

/// Errors returned while reading a structure string.
///
/// Every variant carries enough context to point at the offending input, so
/// callers can log it next to the row that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChemError {
    /// The structure string was empty (or whitespace only).
    #[error("empty structure string")]
    Empty,

    /// A character that cannot start any SMILES token.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedCharacter {
        /// Offending character.
        ch: char,
        /// Character offset in the input.
        pos: usize,
    },

    /// An element symbol missing from the built-in element table.
    #[error("unknown element: {0}")]
    UnknownElement(String),

    /// A bracket atom that is not closed or is malformed.
    #[error("malformed bracket atom at position {0}")]
    BadBracketAtom(usize),

    /// Parentheses do not balance.
    #[error("unbalanced branch at position {0}")]
    UnbalancedBranch(usize),

    /// A ring-closure label was opened but never closed.
    #[error("unclosed ring bond {0}")]
    UnclosedRing(u32),

    /// A bond symbol without an atom on one of its sides, or a bond
    /// conflicting with one already present.
    #[error("dangling or conflicting bond at position {0}")]
    BadBond(usize),
}

// ─────────────────────────────────────────────────────────────────────────────
// Element table
// ─────────────────────────────────────────────────────────────────────────────

/// Static per-element data used by the parser and the descriptors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementInfo {
    /// Element symbol with canonical capitalisation.
    pub symbol: &'static str,
    /// Atomic number (0 for the `*` wildcard).
    pub atomic_number: u8,
    /// Standard atomic weight in Daltons.
    pub atomic_weight: f64,
}

const ELEMENTS: &[ElementInfo] = &[
    ElementInfo { symbol: "*", atomic_number: 0, atomic_weight: 0.0 },
    ElementInfo { symbol: "H", atomic_number: 1, atomic_weight: 1.008 },
    ElementInfo { symbol: "He", atomic_number: 2, atomic_weight: 4.0026 },
    ElementInfo { symbol: "Li", atomic_number: 3, atomic_weight: 6.94 },
    ElementInfo { symbol: "Be", atomic_number: 4, atomic_weight: 9.0122 },
    ElementInfo { symbol: "B", atomic_number: 5, atomic_weight: 10.81 },
    ElementInfo { symbol: "C", atomic_number: 6, atomic_weight: 12.011 },
    ElementInfo { symbol: "N", atomic_number: 7, atomic_weight: 14.007 },
    ElementInfo { symbol: "O", atomic_number: 8, atomic_weight: 15.999 },
    ElementInfo { symbol: "F", atomic_number: 9, atomic_weight: 18.998 },
    ElementInfo { symbol: "Ne", atomic_number: 10, atomic_weight: 20.180 },
    ElementInfo { symbol: "Na", atomic_number: 11, atomic_weight: 22.990 },
    ElementInfo { symbol: "Mg", atomic_number: 12, atomic_weight: 24.305 },
    ElementInfo { symbol: "Al", atomic_number: 13, atomic_weight: 26.982 },
    ElementInfo { symbol: "Si", atomic_number: 14, atomic_weight: 28.085 },
    ElementInfo { symbol: "P", atomic_number: 15, atomic_weight: 30.974 },
    ElementInfo { symbol: "S", atomic_number: 16, atomic_weight: 32.06 },
    ElementInfo { symbol: "Cl", atomic_number: 17, atomic_weight: 35.45 },
    ElementInfo { symbol: "Ar", atomic_number: 18, atomic_weight: 39.948 },
    ElementInfo { symbol: "K", atomic_number: 19, atomic_weight: 39.098 },
    ElementInfo { symbol: "Ca", atomic_number: 20, atomic_weight: 40.078 },
    ElementInfo { symbol: "Ti", atomic_number: 22, atomic_weight: 47.867 },
    ElementInfo { symbol: "V", atomic_number: 23, atomic_weight: 50.942 },
    ElementInfo { symbol: "Cr", atomic_number: 24, atomic_weight: 51.996 },
    ElementInfo { symbol: "Mn", atomic_number: 25, atomic_weight: 54.938 },
    ElementInfo { symbol: "Fe", atomic_number: 26, atomic_weight: 55.845 },
    ElementInfo { symbol: "Co", atomic_number: 27, atomic_weight: 58.933 },
    ElementInfo { symbol: "Ni", atomic_number: 28, atomic_weight: 58.693 },
    ElementInfo { symbol: "Cu", atomic_number: 29, atomic_weight: 63.546 },
    ElementInfo { symbol: "Zn", atomic_number: 30, atomic_weight: 65.38 },
    ElementInfo { symbol: "Ga", atomic_number: 31, atomic_weight: 69.723 },
    ElementInfo { symbol: "Ge", atomic_number: 32, atomic_weight: 72.630 },
    ElementInfo { symbol: "As", atomic_number: 33, atomic_weight: 74.922 },
    ElementInfo { symbol: "Se", atomic_number: 34, atomic_weight: 78.971 },
    ElementInfo { symbol: "Br", atomic_number: 35, atomic_weight: 79.904 },
    ElementInfo { symbol: "Kr", atomic_number: 36, atomic_weight: 83.798 },
    ElementInfo { symbol: "Rb", atomic_number: 37, atomic_weight: 85.468 },
    ElementInfo { symbol: "Sr", atomic_number: 38, atomic_weight: 87.62 },
    ElementInfo { symbol: "Tc", atomic_number: 43, atomic_weight: 98.0 },
    ElementInfo { symbol: "Ru", atomic_number: 44, atomic_weight: 101.07 },
    ElementInfo { symbol: "Rh", atomic_number: 45, atomic_weight: 102.91 },
    ElementInfo { symbol: "Pd", atomic_number: 46, atomic_weight: 106.42 },
    ElementInfo { symbol: "Ag", atomic_number: 47, atomic_weight: 107.87 },
    ElementInfo { symbol: "Cd", atomic_number: 48, atomic_weight: 112.41 },
    ElementInfo { symbol: "Sn", atomic_number: 50, atomic_weight: 118.71 },
    ElementInfo { symbol: "Sb", atomic_number: 51, atomic_weight: 121.76 },
    ElementInfo { symbol: "Te", atomic_number: 52, atomic_weight: 127.60 },
    ElementInfo { symbol: "I", atomic_number: 53, atomic_weight: 126.90 },
    ElementInfo { symbol: "Xe", atomic_number: 54, atomic_weight: 131.29 },
    ElementInfo { symbol: "Cs", atomic_number: 55, atomic_weight: 132.91 },
    ElementInfo { symbol: "Ba", atomic_number: 56, atomic_weight: 137.33 },
    ElementInfo { symbol: "Gd", atomic_number: 64, atomic_weight: 157.25 },
    ElementInfo { symbol: "Pt", atomic_number: 78, atomic_weight: 195.08 },
    ElementInfo { symbol: "Au", atomic_number: 79, atomic_weight: 196.97 },
    ElementInfo { symbol: "Hg", atomic_number: 80, atomic_weight: 200.59 },
    ElementInfo { symbol: "Pb", atomic_number: 82, atomic_weight: 207.2 },
    ElementInfo { symbol: "Bi", atomic_number: 83, atomic_weight: 208.98 },
];

/// Look up an element by its canonical symbol (`"C"`, `"Cl"`, `"*"`).
pub fn element(symbol: &str) -> Option<&'static ElementInfo> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_lookup_is_case_exact() {
        assert_eq!(element("Cl").map(|e| e.atomic_number), Some(17));
        assert!(element("CL").is_none());
        assert_eq!(element("*").map(|e| e.atomic_number), Some(0));
    }
}
