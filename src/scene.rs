//! In-memory molecular scene
//!
//! A plain list of atoms and bonds that answers the interpreter's
//! [`DataStore`] queries. Used by the command line host and by tests;
//! embedding applications normally implement `DataStore` over their own model.

use crate::interpreter::{item_id, DataStore, Domain, ItemProperty, ItemSet, Value};
use indexmap::IndexMap;
use nalgebra::Vector3;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

const WATER: &[&str] = &["HOH", "WAT", "H2O", "DOD"];

const AMINO_ACIDS: &[&str] = &[
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE", "LEU", "LYS", "MET",
    "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL",
];

const ELEMENTS: &[(&str, &str, i32)] = &[
    ("H", "hydrogen", 1),
    ("He", "helium", 2),
    ("Li", "lithium", 3),
    ("B", "boron", 5),
    ("C", "carbon", 6),
    ("N", "nitrogen", 7),
    ("O", "oxygen", 8),
    ("F", "fluorine", 9),
    ("Na", "sodium", 11),
    ("Mg", "magnesium", 12),
    ("P", "phosphorus", 15),
    ("S", "sulfur", 16),
    ("Cl", "chlorine", 17),
    ("K", "potassium", 19),
    ("Ca", "calcium", 20),
    ("Fe", "iron", 26),
    ("Zn", "zinc", 30),
    ("Br", "bromine", 35),
    ("I", "iodine", 53),
];

fn one() -> i32 {
    1
}

/* ===================== Atoms & Bonds ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "one")]
    pub model: i32,
    #[serde(default = "one")]
    pub file: i32,
    #[serde(default)]
    pub residue: String,
    #[serde(default)]
    pub resno: i32,
    #[serde(default)]
    pub chain: String,
    pub position: [f64; 3],
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub occupancy: f64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub radius: f64,
    #[serde(default = "one")]
    pub symop: i32,
    #[serde(default)]
    pub hetero: bool,
    /// User-assigned properties (`{sel}.mark = 1`)
    #[serde(default)]
    pub custom: IndexMap<String, Value>,
}

impl Atom {
    pub fn new(element: &str, position: [f64; 3]) -> Self {
        Self {
            element: element.to_string(),
            name: element.to_string(),
            model: 1,
            file: 1,
            residue: String::new(),
            resno: 0,
            chain: String::new(),
            position,
            charge: 0.0,
            occupancy: 1.0,
            temperature: 0.0,
            radius: 0.0,
            symop: 1,
            hetero: false,
            custom: IndexMap::new(),
        }
    }

    pub fn residue(mut self, name: &str, resno: i32) -> Self {
        self.residue = name.to_string();
        self.resno = resno;
        self
    }

    pub fn model(mut self, model: i32) -> Self {
        self.model = model;
        self
    }

    pub fn hetero(mut self) -> Self {
        self.hetero = true;
        self
    }

    fn point(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }

    fn element_number(&self) -> i32 {
        ELEMENTS
            .iter()
            .find(|(symbol, _, _)| symbol.eq_ignore_ascii_case(&self.element))
            .map(|(_, _, n)| *n)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    #[serde(default = "one")]
    pub order: i32,
}

/* ===================== Scene ===================== */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub atoms: Vec<Atom>,
    #[serde(default)]
    pub bonds: Vec<Bond>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Append an atom, returning its index
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, a: usize, b: usize, order: i32) {
        self.bonds.push(Bond { a, b, order });
    }

    fn select(&self, pred: impl Fn(&Atom) -> bool) -> ItemSet {
        let bits = self
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| pred(*atom))
            .map(|(i, _)| item_id(i))
            .collect();
        ItemSet::atoms(bits)
    }

    fn atom_property(&self, property: &ItemProperty, index: usize) -> Option<Value> {
        let atom = self.atoms.get(index)?;
        let value = match property {
            ItemProperty::AtomIndex => Value::Int(index as i32),
            ItemProperty::Element => Value::Str(atom.element.clone()),
            ItemProperty::ElementNumber => Value::Int(atom.element_number()),
            ItemProperty::AtomName => Value::Str(atom.name.clone()),
            ItemProperty::Model => Value::Int(atom.model),
            ItemProperty::File => Value::Int(atom.file),
            ItemProperty::ResidueName => Value::Str(atom.residue.clone()),
            ItemProperty::ResidueNumber => Value::Int(atom.resno),
            ItemProperty::Chain => Value::Str(atom.chain.clone()),
            ItemProperty::X => Value::Float(atom.position[0]),
            ItemProperty::Y => Value::Float(atom.position[1]),
            ItemProperty::Z => Value::Float(atom.position[2]),
            ItemProperty::Charge => Value::Float(atom.charge),
            ItemProperty::Occupancy => Value::Float(atom.occupancy),
            ItemProperty::Temperature => Value::Float(atom.temperature),
            ItemProperty::Radius => Value::Float(atom.radius),
            ItemProperty::Symop => Value::Int(atom.symop),
            ItemProperty::BondOrder => return None,
            ItemProperty::Custom(name) => atom
                .custom
                .get(name)
                .cloned()
                .unwrap_or_else(Value::empty_string),
        };
        Some(value)
    }

    fn integral_identity(atom: &Atom, property: &ItemProperty) -> Option<i32> {
        match property {
            ItemProperty::Model => Some(atom.model),
            ItemProperty::File => Some(atom.file),
            ItemProperty::Symop => Some(atom.symop),
            _ => None,
        }
    }
}

impl DataStore for Scene {
    fn item_count(&self, domain: Domain) -> usize {
        match domain {
            Domain::Atoms => self.atoms.len(),
            Domain::Bonds => self.bonds.len(),
        }
    }

    fn property(&self, domain: Domain, property: &ItemProperty, index: usize) -> Option<Value> {
        match domain {
            Domain::Atoms => self.atom_property(property, index),
            Domain::Bonds => {
                let bond = self.bonds.get(index)?;
                match property {
                    ItemProperty::BondOrder => Some(Value::Int(bond.order)),
                    ItemProperty::AtomIndex => Some(Value::Int(index as i32)),
                    _ => None,
                }
            }
        }
    }

    fn set_property(
        &mut self,
        set: &ItemSet,
        property: &ItemProperty,
        value: &Value,
    ) -> Result<(), String> {
        if set.domain == Domain::Bonds {
            if *property != ItemProperty::BondOrder {
                return Err(format!("bonds have no settable property {}", property.name()));
            }
            for i in set.indices() {
                if let Some(bond) = self.bonds.get_mut(i) {
                    bond.order = value.as_int();
                }
            }
            return Ok(());
        }

        for i in set.indices() {
            let Some(atom) = self.atoms.get_mut(i) else {
                continue;
            };
            match property {
                ItemProperty::Element => atom.element = value.to_string(),
                ItemProperty::AtomName => atom.name = value.to_string(),
                ItemProperty::ResidueName => atom.residue = value.to_string(),
                ItemProperty::Chain => atom.chain = value.to_string(),
                ItemProperty::ResidueNumber => atom.resno = value.as_int(),
                ItemProperty::X => atom.position[0] = value.as_float(),
                ItemProperty::Y => atom.position[1] = value.as_float(),
                ItemProperty::Z => atom.position[2] = value.as_float(),
                ItemProperty::Charge => atom.charge = value.as_float(),
                ItemProperty::Occupancy => atom.occupancy = value.as_float(),
                ItemProperty::Temperature => atom.temperature = value.as_float(),
                ItemProperty::Radius => atom.radius = value.as_float(),
                ItemProperty::Custom(name) => {
                    atom.custom.insert(name.clone(), value.clone());
                }
                other => return Err(format!("{} is read-only", other.name())),
            }
        }
        Ok(())
    }

    fn named_set(&self, name: &str) -> Option<ItemSet> {
        let set = match name {
            "all" | "atoms" => ItemSet::full(self.atoms.len(), Domain::Atoms),
            "none" => ItemSet::empty(Domain::Atoms),
            "bonds" => ItemSet::full(self.bonds.len(), Domain::Bonds),
            "water" => self.select(|a| WATER.contains(&a.residue.to_ascii_uppercase().as_str())),
            "hetero" => self.select(|a| a.hetero),
            "protein" | "amino" => {
                self.select(|a| AMINO_ACIDS.contains(&a.residue.to_ascii_uppercase().as_str()))
            }
            _ => {
                let (symbol, _, _) = ELEMENTS.iter().find(|(_, long, _)| *long == name)?;
                self.select(|a| a.element.eq_ignore_ascii_case(symbol))
            }
        };
        Some(set)
    }

    fn item_range(&self, property: &ItemProperty, value: &Value) -> Option<Range<usize>> {
        let wanted = value.as_int();
        let hit = |atom: &Atom| Self::integral_identity(atom, property) == Some(wanted);
        let Some(start) = self.atoms.iter().position(hit) else {
            return Some(0..0);
        };
        let len = self.atoms[start..].iter().take_while(|a| hit(*a)).count();
        let end = start + len;
        // a later run means the items are not contiguous
        if self.atoms[end..].iter().any(hit) {
            return None;
        }
        Some(start..end)
    }

    fn within(&self, distance: f64, atoms: &RoaringBitmap) -> RoaringBitmap {
        let centers: Vec<Vector3<f64>> = atoms
            .iter()
            .filter_map(|id| self.atoms.get(id as usize).map(Atom::point))
            .collect();
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| {
                let p = atom.point();
                centers.iter().any(|c| (p - c).norm() <= distance)
            })
            .map(|(i, _)| item_id(i))
            .collect()
    }

    fn connected(&self, atoms: &RoaringBitmap) -> RoaringBitmap {
        let mut bits = RoaringBitmap::new();
        for bond in &self.bonds {
            if atoms.contains(item_id(bond.a)) {
                bits.insert(item_id(bond.b));
            }
            if atoms.contains(item_id(bond.b)) {
                bits.insert(item_id(bond.a));
            }
        }
        bits
    }

    fn bonds_of(&self, atoms: &RoaringBitmap) -> RoaringBitmap {
        self.bonds
            .iter()
            .enumerate()
            .filter(|(_, bond)| atoms.contains(item_id(bond.a)) || atoms.contains(item_id(bond.b)))
            .map(|(i, _)| item_id(i))
            .collect()
    }
}
