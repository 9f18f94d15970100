use super::Symbol;
use std::collections::HashMap;

#[derive(Default)]
pub struct Interner {
    map: HashMap<Box<str>, u32>,
    strings: Vec<Box<str>>,
}

impl Interner {
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&idx) = self.map.get(s) {
            return Symbol(idx);
        }

        let idx = self.strings.len() as u32;
        self.strings.push(s.into());
        self.map.insert(s.into(), idx);
        Symbol(idx)
    }

    pub fn lookup(&self, idx: u32) -> &str {
        &self.strings[idx as usize]
    }
}
