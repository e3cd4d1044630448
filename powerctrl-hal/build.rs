use std::env;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use proc_macro2::TokenStream;
use quote::format_ident;
use quote::quote;

mod build_serde;
use build_serde::{Access, Block, Family, Register};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // At most one family may be selected; none is fine for host builds and the simulator.
    match env::vars()
        .map(|(a, _)| a)
        .filter(|x| x.starts_with("CARGO_FEATURE_STM32"))
        .get_one()
    {
        Ok(_) | Err(GetOneError::None) => {}
        Err(GetOneError::Multiple) => panic!("Multiple stm32xx Cargo features enabled"),
    }

    println!("cargo:rerun-if-changed=data");
    println!("cargo:rerun-if-changed=build_serde.rs");

    let mut paths: Vec<PathBuf> = fs::read_dir("data")?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "yaml"))
        .collect();
    paths.sort();

    let mut token_stream = TokenStream::new();
    for path in &paths {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let family: Family = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

        for block in &family.blocks {
            for reg in &block.registers {
                reg.check(&block.name)?;
            }
        }

        token_stream.extend(generate_family(&family));
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dest_path = out_dir.join("_generated.rs");
    let mut file = File::create(&dest_path).unwrap();
    write!(file, "{}", token_stream).unwrap();
    rustfmt(&dest_path);

    Ok(())
}

fn generate_family(family: &Family) -> TokenStream {
    let family_ident = format_ident!("{}", family.name);
    let family_name = &family.name;

    let prio_bits = family.nvic_prio_bits.map(|bits| {
        quote! {
            /// Implemented NVIC priority bits.
            pub const NVIC_PRIO_BITS: u8 = #bits;
        }
    });

    let mut blocks = TokenStream::new();
    let mut registers = Vec::new();
    let mut fields = Vec::new();
    let mut field_names = Vec::new();

    for block in &family.blocks {
        blocks.extend(generate_block(block, &mut registers, &mut fields, &mut field_names));
    }

    quote! {
        #[doc = concat!("Register map for `", #family_name, "`.")]
        pub mod #family_ident {
            pub const NAME: &str = #family_name;
            #prio_bits

            #blocks

            /// Every scalar register of this family, with its reset value.
            pub const REGISTERS: &[crate::regs::Reg] = &[#(#registers),*];
            /// Every field of the scalar registers above.
            pub const FIELDS: &[crate::regs::Field] = &[#(#fields),*];
            /// `BLOCK.REG.FIELD` names of [`FIELDS`], in the same order.
            pub const FIELD_NAMES: &[&str] = &[#(#field_names),*];
        }
    }
}

fn generate_block(
    block: &Block,
    registers: &mut Vec<TokenStream>,
    fields: &mut Vec<TokenStream>,
    field_names: &mut Vec<String>,
) -> TokenStream {
    let block_ident = format_ident!("{}", block.name.to_ascii_lowercase());
    let base = block.base;
    let doc = block
        .description
        .clone()
        .unwrap_or_else(|| format!("{} register block.", block.name));

    let mut items = TokenStream::new();
    for reg in &block.registers {
        items.extend(generate_register(block, reg));

        if reg.array.is_none() {
            let reg_ident = format_ident!("{}", reg.name);
            let field_mod = format_ident!("{}", reg.name.to_ascii_lowercase());
            registers.push(quote!(#block_ident::#reg_ident));
            for f in &reg.fields {
                let f_ident = format_ident!("{}", f.name);
                fields.push(quote!(#block_ident::#field_mod::#f_ident));
                field_names.push(format!("{}.{}.{}", block.name, reg.name, f.name));
            }
        }
    }

    quote! {
        #[doc = #doc]
        pub mod #block_ident {
            pub const BASE: u32 = #base;
            #items
        }
    }
}

fn generate_register(block: &Block, reg: &Register) -> TokenStream {
    let reg_ident = format_ident!("{}", reg.name);
    let field_mod = format_ident!("{}", reg.name.to_ascii_lowercase());
    let full_name = format!("{}.{}", block.name, reg.name);
    let addr = block.base + reg.byte_offset;
    let reset = reg.reset;
    let doc = reg.description.clone().unwrap_or_else(|| full_name.clone());

    let (decl, field_reg) = match reg.array {
        None => (
            quote! {
                #[doc = #doc]
                pub const #reg_ident: crate::regs::Reg =
                    crate::regs::Reg::new(#full_name, #addr, #reset);
            },
            quote!(super::#reg_ident),
        ),
        Some(array) => {
            let len = array.len;
            let stride = array.stride;
            (
                quote! {
                    #[doc = #doc]
                    pub const #reg_ident: crate::regs::RegArray =
                        crate::regs::RegArray::new(#full_name, #addr, #reset, #len, #stride);
                },
                quote!(super::#reg_ident.at(0)),
            )
        }
    };

    let field_items = reg.fields.iter().map(|f| {
        let f_ident = format_ident!("{}", f.name);
        let pos = f.bit_offset;
        let width = f.bit_size;
        let read_only = f.access == Access::Read;
        quote! {
            pub const #f_ident: crate::regs::Field =
                crate::regs::Field::new(#field_reg, #pos, #width, #read_only);
        }
    });

    quote! {
        #decl
        #[allow(dead_code)]
        pub mod #field_mod {
            #(#field_items)*
        }
    }
}

enum GetOneError {
    None,
    Multiple,
}

trait IteratorExt: Iterator {
    fn get_one(self) -> Result<Self::Item, GetOneError>;
}

impl<T: Iterator> IteratorExt for T {
    fn get_one(mut self) -> Result<Self::Item, GetOneError> {
        match self.next() {
            None => Err(GetOneError::None),
            Some(res) => match self.next() {
                Some(_) => Err(GetOneError::Multiple),
                None => Ok(res),
            },
        }
    }
}

/// rustfmt a given path.
/// Failures are logged to stderr and ignored.
fn rustfmt(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match Command::new("rustfmt").args([path]).output() {
        Err(e) => {
            eprintln!("failed to exec rustfmt {:?}: {:?}", path, e);
        }
        Ok(out) => {
            if !out.status.success() {
                eprintln!("rustfmt {:?} failed:", path);
                eprintln!("=== STDOUT:");
                std::io::stderr().write_all(&out.stdout).unwrap();
                eprintln!("=== STDERR:");
                std::io::stderr().write_all(&out.stderr).unwrap();
            }
        }
    }
}
