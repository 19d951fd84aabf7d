// src/chem/smiles.rs
//! SMILES → molecular graph.
//!
//! A single left-to-right pass over the string builds atoms and bonds.
//! Branches are handled with an explicit stack of attachment points and ring
//! closures with a table of open labels. Implicit hydrogens are assigned after
//! the pass, once every bond of an organic-subset atom is known; bracket atoms
//! carry their hydrogen count explicitly.
//!
//! ```
//! use ic50::chem::parse_smiles;
//!
//! let benzene = parse_smiles("c1ccccc1").unwrap();
//! assert_eq!(benzene.atom_count(), 6);
//! assert_eq!(benzene.bond_count(), 6);
//! assert!(benzene.atoms().iter().all(|a| a.total_h() == 1));
//! ```

use std::collections::HashMap;

use super::{element, ChemError};

/// Bond multiplicity as written (or implied) in the SMILES string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    /// `-`, `/`, `\` or implicit between aliphatic atoms.
    Single,
    /// `=`
    Double,
    /// `#`
    Triple,
    /// `$`
    Quadruple,
    /// `:` or implicit between two aromatic atoms.
    Aromatic,
}

impl BondOrder {
    /// Contribution to the valence of each endpoint. Aromatic bonds count as
    /// one; the extra half-bond is added per aromatic atom instead.
    pub fn valence(self) -> u32 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    /// Stable integer code used when hashing atom environments.
    pub fn code(self) -> u32 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
            BondOrder::Aromatic => 12,
        }
    }
}

/// One atom of a parsed molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Canonical element symbol (`"C"`, `"Cl"`, `"*"`).
    pub symbol: &'static str,
    /// Atomic number (0 for `*`).
    pub atomic_number: u8,
    /// Written in lower case (aromatic) in the input.
    pub aromatic: bool,
    /// Formal charge from a bracket atom.
    pub charge: i8,
    /// Isotope label from a bracket atom.
    pub isotope: Option<u16>,
    /// Came from a bracket (`[...]`), so its hydrogen count is explicit.
    pub bracket: bool,
    hydrogens: u8,
}

impl Atom {
    /// Hydrogens attached to this atom (implicit or bracket-specified).
    pub fn total_h(&self) -> u8 {
        self.hydrogens
    }

    /// Heavy atom, i.e. not hydrogen and not a wildcard.
    pub fn is_heavy(&self) -> bool {
        self.atomic_number > 1
    }
}

/// A bond between two atom indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    /// First endpoint (atom index).
    pub a: usize,
    /// Second endpoint (atom index).
    pub b: usize,
    /// Bond order.
    pub order: BondOrder,
}

impl Bond {
    /// The endpoint that is not `atom`.
    pub fn other(&self, atom: usize) -> usize {
        if self.a == atom {
            self.b
        } else {
            self.a
        }
    }
}

/// Molecular graph with adjacency lists and ring-membership flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// For every atom: `(neighbor atom, bond index)`.
    adjacency: Vec<Vec<(usize, usize)>>,
    ring_bonds: Vec<bool>,
}

impl Molecule {
    /// All atoms in input order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// All bonds in creation order.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Number of atoms.
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Number of bonds.
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// `(neighbor, bond index)` pairs for `atom`.
    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    /// Number of explicit graph neighbours.
    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// Whether the bond lies on a cycle.
    pub fn is_ring_bond(&self, bond: usize) -> bool {
        self.ring_bonds[bond]
    }

    /// Whether any bond of the atom lies on a cycle.
    pub fn is_ring_atom(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|&(_, b)| self.ring_bonds[b])
    }

    fn add_bond(&mut self, a: usize, b: usize, order: BondOrder, pos: usize) -> Result<(), ChemError> {
        if a == b || self.adjacency[a].iter().any(|&(n, _)| n == b) {
            return Err(ChemError::BadBond(pos));
        }
        let idx = self.bonds.len();
        self.bonds.push(Bond { a, b, order });
        self.adjacency[a].push((b, idx));
        self.adjacency[b].push((a, idx));
        Ok(())
    }

    fn push_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }
}

/// Parse a SMILES string into a [`Molecule`].
///
/// Anything after the first whitespace character is treated as a title and
/// ignored, as most SMILES files do.
///
/// # Errors
///
/// Returns a [`ChemError`] describing the first problem encountered.
pub fn parse_smiles(smiles: &str) -> Result<Molecule, ChemError> {
    let body = smiles.trim_start().split_whitespace().next().unwrap_or("");
    if body.is_empty() {
        return Err(ChemError::Empty);
    }

    let chars: Vec<char> = body.chars().collect();
    let mut mol = Molecule {
        atoms: Vec::new(),
        bonds: Vec::new(),
        adjacency: Vec::new(),
        ring_bonds: Vec::new(),
    };

    let mut prev: Option<usize> = None;
    let mut pending: Option<BondOrder> = None;
    let mut branches: Vec<Option<usize>> = Vec::new();
    let mut open_rings: HashMap<u32, (usize, Option<BondOrder>)> = HashMap::new();

    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => {
                if prev.is_none() {
                    return Err(ChemError::UnbalancedBranch(i));
                }
                branches.push(prev);
                i += 1;
            }
            ')' => {
                if pending.is_some() {
                    return Err(ChemError::BadBond(i));
                }
                prev = branches.pop().ok_or(ChemError::UnbalancedBranch(i))?;
                i += 1;
            }
            '-' | '=' | '#' | '$' | ':' | '/' | '\\' => {
                if pending.is_some() || prev.is_none() {
                    return Err(ChemError::BadBond(i));
                }
                pending = Some(match c {
                    '=' => BondOrder::Double,
                    '#' => BondOrder::Triple,
                    '$' => BondOrder::Quadruple,
                    ':' => BondOrder::Aromatic,
                    _ => BondOrder::Single,
                });
                i += 1;
            }
            '.' => {
                if pending.is_some() || prev.is_none() {
                    return Err(ChemError::BadBond(i));
                }
                prev = None;
                i += 1;
            }
            '0'..='9' | '%' => {
                let start = i;
                let label = if c == '%' {
                    let digits: String = chars.iter().skip(i + 1).take(2).collect();
                    if digits.len() != 2 || !digits.chars().all(|d| d.is_ascii_digit()) {
                        return Err(ChemError::UnexpectedCharacter { ch: c, pos: i });
                    }
                    i += 3;
                    digits.parse::<u32>().map_err(|_| ChemError::UnexpectedCharacter { ch: c, pos: start })?
                } else {
                    i += 1;
                    c.to_digit(10).unwrap_or_default()
                };
                let current = prev.ok_or(ChemError::BadBond(start))?;
                match open_rings.remove(&label) {
                    Some((opener, open_order)) => {
                        let order = match (open_order, pending.take()) {
                            (Some(a), Some(b)) if a != b => return Err(ChemError::BadBond(start)),
                            (Some(a), _) | (None, Some(a)) => a,
                            (None, None) => implied_order(&mol.atoms[opener], &mol.atoms[current]),
                        };
                        mol.add_bond(opener, current, order, start)?;
                    }
                    None => {
                        open_rings.insert(label, (current, pending.take()));
                    }
                }
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|off| i + off)
                    .ok_or(ChemError::BadBracketAtom(i))?;
                let content: String = chars[i + 1..close].iter().collect();
                let atom = parse_bracket_atom(&content, i)?;
                attach(&mut mol, atom, &mut prev, &mut pending, i)?;
                i = close + 1;
            }
            _ if c.is_ascii_alphabetic() || c == '*' => {
                let (atom, width) = parse_organic_atom(&chars, i)?;
                attach(&mut mol, atom, &mut prev, &mut pending, i)?;
                i += width;
            }
            _ => return Err(ChemError::UnexpectedCharacter { ch: c, pos: i }),
        }
    }

    if !branches.is_empty() {
        return Err(ChemError::UnbalancedBranch(chars.len()));
    }
    if let Some(label) = open_rings.keys().min() {
        return Err(ChemError::UnclosedRing(*label));
    }
    if pending.is_some() {
        return Err(ChemError::BadBond(chars.len()));
    }
    if mol.atoms.is_empty() {
        return Err(ChemError::Empty);
    }

    assign_implicit_hydrogens(&mut mol);
    mol.ring_bonds = find_ring_bonds(&mol);
    Ok(mol)
}

fn implied_order(a: &Atom, b: &Atom) -> BondOrder {
    if a.aromatic && b.aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

fn attach(
    mol: &mut Molecule,
    atom: Atom,
    prev: &mut Option<usize>,
    pending: &mut Option<BondOrder>,
    pos: usize,
) -> Result<(), ChemError> {
    let idx = mol.push_atom(atom);
    if let Some(p) = *prev {
        let order = pending
            .take()
            .unwrap_or_else(|| implied_order(&mol.atoms[p], &mol.atoms[idx]));
        mol.add_bond(p, idx, order, pos)?;
    }
    *prev = Some(idx);
    Ok(())
}

fn new_atom(symbol: &str, aromatic: bool) -> Result<Atom, ChemError> {
    let info = element(symbol).ok_or_else(|| ChemError::UnknownElement(symbol.to_string()))?;
    Ok(Atom {
        symbol: info.symbol,
        atomic_number: info.atomic_number,
        aromatic,
        charge: 0,
        isotope: None,
        bracket: false,
        hydrogens: 0,
    })
}

/// Organic-subset atom outside brackets. Returns the atom and the number of
/// characters consumed.
fn parse_organic_atom(chars: &[char], i: usize) -> Result<(Atom, usize), ChemError> {
    let c = chars[i];
    let next = chars.get(i + 1).copied();
    let (symbol, aromatic, width) = match (c, next) {
        ('B', Some('r')) => ("Br", false, 2),
        ('C', Some('l')) => ("Cl", false, 2),
        ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I', _) => (organic_symbol(c), false, 1),
        ('b' | 'c' | 'n' | 'o' | 'p' | 's', _) => (organic_symbol(c.to_ascii_uppercase()), true, 1),
        ('*', _) => ("*", false, 1),
        _ => return Err(ChemError::UnexpectedCharacter { ch: c, pos: i }),
    };
    Ok((new_atom(symbol, aromatic)?, width))
}

fn organic_symbol(c: char) -> &'static str {
    match c {
        'B' => "B",
        'C' => "C",
        'N' => "N",
        'O' => "O",
        'P' => "P",
        'S' => "S",
        'F' => "F",
        _ => "I",
    }
}

/// `[isotope? symbol chirality? hcount? charge? class?]`
fn parse_bracket_atom(content: &str, pos: usize) -> Result<Atom, ChemError> {
    let chars: Vec<char> = content.chars().collect();
    let bad = || ChemError::BadBracketAtom(pos);
    let mut i = 0usize;

    let isotope_digits: String = chars.iter().take_while(|c| c.is_ascii_digit()).collect();
    i += isotope_digits.len();
    let isotope = if isotope_digits.is_empty() {
        None
    } else {
        Some(isotope_digits.parse::<u16>().map_err(|_| bad())?)
    };

    let first = *chars.get(i).ok_or_else(bad)?;
    let second = chars.get(i + 1).copied();
    let (symbol, aromatic) = if first == '*' {
        i += 1;
        ("*".to_string(), false)
    } else if first.is_ascii_uppercase() {
        match second {
            Some(s) if s.is_ascii_lowercase() && element(&format!("{first}{s}")).is_some() => {
                i += 2;
                (format!("{first}{s}"), false)
            }
            _ => {
                i += 1;
                (first.to_string(), false)
            }
        }
    } else if first.is_ascii_lowercase() {
        match (first, second) {
            ('s', Some('e')) | ('a', Some('s')) => {
                i += 2;
                (format!("{}{}", first.to_ascii_uppercase(), second.unwrap_or_default()), true)
            }
            ('b' | 'c' | 'n' | 'o' | 'p' | 's', _) => {
                i += 1;
                (first.to_ascii_uppercase().to_string(), true)
            }
            _ => return Err(bad()),
        }
    } else {
        return Err(bad());
    };

    let mut atom = new_atom(&symbol, aromatic)?;
    atom.bracket = true;
    atom.isotope = isotope;

    // chirality: @, @@, @TH1, @SP2, ...
    while chars.get(i) == Some(&'@') {
        i += 1;
    }
    if chars.get(i).is_some_and(|c| c.is_ascii_uppercase() && *c != 'H')
        && chars.get(i + 1).is_some_and(|c| c.is_ascii_uppercase())
    {
        i += 2;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }

    if chars.get(i) == Some(&'H') {
        i += 1;
        let digits: String = chars[i..].iter().take_while(|c| c.is_ascii_digit()).collect();
        i += digits.len();
        atom.hydrogens = if digits.is_empty() { 1 } else { digits.parse().map_err(|_| bad())? };
    }

    if let Some(&(sign @ ('+' | '-'))) = chars.get(i) {
        i += 1;
        let unit: i8 = if sign == '+' { 1 } else { -1 };
        let digits: String = chars[i..].iter().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            i += digits.len();
            atom.charge = unit * digits.parse::<i8>().map_err(|_| bad())?;
        } else {
            let mut magnitude = 1i8;
            while chars.get(i) == Some(&sign) {
                magnitude = magnitude.checked_add(1).ok_or_else(bad)?;
                i += 1;
            }
            atom.charge = unit * magnitude;
        }
    }

    if chars.get(i) == Some(&':') {
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }

    if i != chars.len() {
        return Err(bad());
    }
    Ok(atom)
}

fn default_valences(symbol: &str) -> &'static [u32] {
    match symbol {
        "B" => &[3],
        "C" => &[4],
        "N" => &[3, 5],
        "O" => &[2],
        "P" => &[3, 5],
        "S" => &[2, 4, 6],
        "F" | "Cl" | "Br" | "I" => &[1],
        _ => &[],
    }
}

fn assign_implicit_hydrogens(mol: &mut Molecule) {
    for idx in 0..mol.atoms.len() {
        if mol.atoms[idx].bracket {
            continue;
        }
        let used: u32 = mol.adjacency[idx]
            .iter()
            .map(|&(_, b)| mol.bonds[b].order.valence())
            .sum();
        let valences = default_valences(mol.atoms[idx].symbol);
        // aromatic atoms only take their lowest valence; the ring's extra
        // half-bond counts as one more
        let h = if mol.atoms[idx].aromatic {
            valences.first().map_or(0, |&v| v.saturating_sub(used + 1))
        } else {
            valences.iter().find(|&&v| v >= used).map_or(0, |&v| v - used)
        };
        mol.atoms[idx].hydrogens = u8::try_from(h).unwrap_or(u8::MAX);
    }
}

/// A bond is a ring bond iff it is not a bridge. Bridges come from an
/// iterative low-link DFS over every connected component.
fn find_ring_bonds(mol: &Molecule) -> Vec<bool> {
    let n = mol.atoms.len();
    let mut ring = vec![true; mol.bonds.len()];
    let mut disc = vec![usize::MAX; n];
    let mut low = vec![0usize; n];
    let mut timer = 0usize;

    for root in 0..n {
        if disc[root] != usize::MAX {
            continue;
        }
        // (atom, bond used to enter it, next adjacency slot to visit)
        let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];
        disc[root] = timer;
        low[root] = timer;
        timer += 1;

        while let Some(top) = stack.last_mut() {
            let (v, parent_bond, slot) = *top;
            if let Some(&(w, b)) = mol.adjacency[v].get(slot) {
                top.2 += 1;
                if Some(b) == parent_bond {
                    continue;
                }
                if disc[w] == usize::MAX {
                    disc[w] = timer;
                    low[w] = timer;
                    timer += 1;
                    stack.push((w, Some(b), 0));
                } else {
                    low[v] = low[v].min(disc[w]);
                }
            } else {
                stack.pop();
                if let (Some(b), Some(&(u, _, _))) = (parent_bond, stack.last()) {
                    low[u] = low[u].min(low[v]);
                    if low[v] > disc[u] {
                        ring[b] = false;
                    }
                }
            }
        }
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethanol_hydrogens() {
        let mol = parse_smiles("CCO").unwrap();
        let h: Vec<u8> = mol.atoms().iter().map(Atom::total_h).collect();
        assert_eq!(h, vec![3, 2, 1]);
        assert!(!mol.is_ring_bond(0));
    }

    #[test]
    fn aspirin_graph() {
        let mol = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        assert_eq!(mol.atom_count(), 13);
        assert_eq!(mol.bond_count(), 13);
        let ring_atoms = (0..mol.atom_count()).filter(|&i| mol.is_ring_atom(i)).count();
        assert_eq!(ring_atoms, 6);
        // carbonyl carbon of the acetyl group has no hydrogens
        assert_eq!(mol.atoms()[1].total_h(), 0);
    }

    #[test]
    fn bracket_atoms() {
        let mol = parse_smiles("[NH4+].[Cl-]").unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.bond_count(), 0);
        assert_eq!(mol.atoms()[0].charge, 1);
        assert_eq!(mol.atoms()[0].total_h(), 4);
        assert_eq!(mol.atoms()[1].symbol, "Cl");
        assert_eq!(mol.atoms()[1].charge, -1);

        let mol = parse_smiles("[13CH3][C@@H](O)c1cc[nH]c1").unwrap();
        assert_eq!(mol.atoms()[0].isotope, Some(13));
        assert_eq!(mol.atoms()[1].total_h(), 1);
    }

    #[test]
    fn ring_closure_with_percent_label() {
        let mol = parse_smiles("C%10CCCCC%10").unwrap();
        assert_eq!(mol.bond_count(), 6);
        assert!((0..6).all(|b| mol.is_ring_bond(b)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_smiles(""), Err(ChemError::Empty));
        assert_eq!(parse_smiles("C1CC"), Err(ChemError::UnclosedRing(1)));
        assert!(matches!(parse_smiles("CC(C"), Err(ChemError::UnbalancedBranch(_))));
        assert!(matches!(parse_smiles("CC)C"), Err(ChemError::UnbalancedBranch(_))));
        assert!(matches!(parse_smiles("C=)"), Err(ChemError::BadBond(_))));
        assert!(matches!(parse_smiles("[Xx]"), Err(ChemError::BadBracketAtom(_)) | Err(ChemError::UnknownElement(_))));
        assert!(matches!(parse_smiles("C?C"), Err(ChemError::UnexpectedCharacter { ch: '?', .. })));
        assert!(matches!(parse_smiles("[CH3"), Err(ChemError::BadBracketAtom(_))));
    }

    #[test]
    fn aromatic_heteroatoms_take_lowest_valence() {
        let h = |smiles: &str| -> Vec<u8> { parse_smiles(smiles).unwrap().atoms().iter().map(Atom::total_h).collect() };
        // N-methylimidazole: the substituted ring nitrogen carries no hydrogen
        assert_eq!(h("Cn1ccnc1"), vec![3, 0, 1, 1, 0, 1]);
        assert_eq!(h("c1ccsc1"), vec![1, 1, 1, 0, 1]);
        assert_eq!(h("c1ccoc1"), vec![1, 1, 1, 0, 1]);
        assert_eq!(h("c1ccncc1"), vec![1, 1, 1, 0, 1, 1]);
        // pyrrole hydrogen is written explicitly
        assert_eq!(h("c1cc[nH]c1"), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn pathological_strings_fail_without_panicking() {
        let long_charge = format!("[C{}]", "+".repeat(130));
        let long_minus = format!("[O{}]", "-".repeat(300));
        let deep = format!("C{}", "(".repeat(5000));
        for smiles in [long_charge.as_str(), long_minus.as_str(), "[C+999]", "[CH999]", "C%", "C1CC%1", deep.as_str(), "((("] {
            let result = std::panic::catch_unwind(|| crate::table::Structure::from_smiles(smiles, 3));
            let structure = result.unwrap_or_else(|_| panic!("panicked on {smiles:?}"));
            assert!(!structure.is_parsed(), "{smiles:?} parsed");
        }
        // 127 repeated signs is the largest charge an i8 holds
        let max = parse_smiles(&format!("[C{}]", "+".repeat(127))).unwrap();
        assert_eq!(max.atoms()[0].charge, 127);
    }

    #[test]
    fn title_after_whitespace_is_ignored() {
        let mol = parse_smiles("CCO ethanol").unwrap();
        assert_eq!(mol.atom_count(), 3);
    }
}
