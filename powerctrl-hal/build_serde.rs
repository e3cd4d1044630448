use serde::{Deserialize, Serialize};

// ---------- data/<family>.yaml ----------

// The layout follows [chiptool](https://github.com/embassy-rs/chiptool/blob/main/src/ir.rs)
// naming (`byte_offset`, `bit_offset`, `bit_size`, `access`), flattened to one file per family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvic_prio_bits: Option<u8>,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub base: u32,
    pub registers: Vec<Register>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub byte_offset: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<Array>,
    pub fields: Vec<Field>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Array {
    pub len: u32,
    pub stride: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub bit_offset: u8,
    pub bit_size: u8,
    #[serde(default = "default_readwrite", skip_serializing_if = "is_readwrite")]
    pub access: Access,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadWrite,
    Read,
}

fn default_readwrite() -> Access {
    Access::ReadWrite
}

fn is_readwrite(x: &Access) -> bool {
    *x == Access::ReadWrite
}

fn is_zero(x: &u32) -> bool {
    *x == 0
}

impl Register {
    pub fn check(&self, block: &str) -> Result<(), String> {
        for f in &self.fields {
            if f.bit_size == 0 || u32::from(f.bit_offset) + u32::from(f.bit_size) > 32 {
                return Err(format!(
                    "{}.{}.{}: field does not fit in a 32-bit register",
                    block, self.name, f.name
                ));
            }
        }
        for (i, a) in self.fields.iter().enumerate() {
            for b in &self.fields[i + 1..] {
                if a.mask() & b.mask() != 0 {
                    return Err(format!(
                        "{}.{}: fields {} and {} overlap",
                        block, self.name, a.name, b.name
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Field {
    pub fn mask(&self) -> u32 {
        let raw = if self.bit_size >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bit_size) - 1
        };
        raw << self.bit_offset
    }
}
