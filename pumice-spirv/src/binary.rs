//! SPIR-V program binary and module header.
use std::convert::TryInto;
use std::iter::FromIterator;

use crate::error::{ParseError, Result};
use crate::instr::{Instr, Instrs};

pub const MAGIC: u32 = 0x0723_0203;
pub const HEADER_LEN: usize = 5;

/// The five-word module header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvHeader {
    pub magic: u32,
    pub version: u32,
    pub generator: u32,
    pub bound: u32,
    pub schema: u32,
}
impl Default for SpirvHeader {
    fn default() -> Self {
        SpirvHeader {
            magic: MAGIC,
            version: ((spirv::MAJOR_VERSION as u32) << 16) | ((spirv::MINOR_VERSION as u32) << 8),
            generator: 0,
            bound: 0,
            schema: 0,
        }
    }
}
impl SpirvHeader {
    pub fn version_major(&self) -> u32 {
        (self.version >> 16) & 0xFF
    }
    pub fn version_minor(&self) -> u32 {
        (self.version >> 8) & 0xFF
    }
    pub fn words(&self) -> [u32; HEADER_LEN] {
        [
            self.magic,
            self.version,
            self.generator,
            self.bound,
            self.schema,
        ]
    }

    /// Decodes and validates the header at the front of `words`.
    pub fn decode(words: &[u32]) -> Result<SpirvHeader> {
        if words.len() < HEADER_LEN {
            return Err(ParseError::new(0, "binary is shorter than the header"));
        }
        let header = SpirvHeader {
            magic: words[0],
            version: words[1],
            generator: words[2],
            bound: words[3],
            schema: words[4],
        };
        if header.magic != MAGIC {
            return Err(ParseError::new(0, "invalid magic number"));
        }
        if header.version_major() != 1 {
            return Err(ParseError::new(
                1,
                format!(
                    "unsupported SPIR-V version {}.{}",
                    header.version_major(),
                    header.version_minor()
                ),
            ));
        }
        if header.bound == 0 {
            return Err(ParseError::new(3, "id bound is zero"));
        }
        Ok(header)
    }
}

/// SPIR-V program binary.
#[derive(Debug, Default, Clone)]
pub struct SpirvBinary(Vec<u32>);
impl From<Vec<u32>> for SpirvBinary {
    fn from(words: Vec<u32>) -> Self {
        SpirvBinary(words)
    }
}
impl From<&[u32]> for SpirvBinary {
    fn from(words: &[u32]) -> Self {
        SpirvBinary(words.to_owned())
    }
}
impl FromIterator<u32> for SpirvBinary {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        SpirvBinary(iter.into_iter().collect())
    }
}
impl From<&[u8]> for SpirvBinary {
    /// Word endianness is sniffed from the first magic byte, as producers may
    /// emit either byte order.
    fn from(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return SpirvBinary::default();
        }
        bytes
            .chunks_exact(4)
            .map(|chunk| chunk.try_into().unwrap())
            .map(match bytes[0] {
                0x03 => u32::from_le_bytes,
                0x07 => u32::from_be_bytes,
                _ => return SpirvBinary::default(),
            })
            .collect()
    }
}
impl From<Vec<u8>> for SpirvBinary {
    fn from(bytes: Vec<u8>) -> Self {
        SpirvBinary::from(bytes.as_slice())
    }
}

impl SpirvBinary {
    pub fn words(&self) -> &[u32] {
        &self.0
    }
    pub fn into_words(self) -> Vec<u32> {
        self.0
    }
    pub fn header(&self) -> Result<SpirvHeader> {
        SpirvHeader::decode(&self.0)
    }
    /// Instruction cursor positioned after the header.
    pub fn instrs(&self) -> Result<Instrs<'_>> {
        self.header()?;
        Ok(Instrs::new(&self.0[HEADER_LEN..], HEADER_LEN))
    }
}

/// Callbacks driven by [`parse`]. The error type is the caller's; parse
/// errors convert into it so parsing stops at the first failure either way.
pub trait Visitor {
    type Error: From<ParseError>;

    fn header(&mut self, header: &SpirvHeader) -> Result<(), Self::Error>;
    fn instruction(&mut self, at: usize, instr: &Instr) -> Result<(), Self::Error>;
}

/// Validates the header and hands every instruction, with its start word
/// offset, to the visitor.
pub fn parse<V: Visitor>(words: &[u32], visitor: &mut V) -> Result<(), V::Error> {
    let header = SpirvHeader::decode(words)?;
    visitor.header(&header)?;
    let mut instrs = Instrs::new(&words[HEADER_LEN..], HEADER_LEN);
    while let Some((at, instr)) = instrs.next()? {
        visitor.instruction(at, instr)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::InstructionBuilder;
    use spirv::Op;

    fn module_with(instrs: &[crate::instr::Instruction]) -> SpirvBinary {
        let mut header = SpirvHeader::default();
        header.bound = 8;
        let mut words = header.words().to_vec();
        for instr in instrs {
            words.extend_from_slice(instr.as_ref());
        }
        SpirvBinary::from(words)
    }

    #[test]
    fn bad_magic_is_rejected() {
        let words = [0xDEAD_BEEF, 0x0001_0000, 0, 4, 0];
        assert!(SpirvHeader::decode(&words).is_err());
    }

    #[test]
    fn header_roundtrip() {
        let module = module_with(&[]);
        let header = module.header().unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version_major(), 1);
        assert_eq!(header.bound, 8);
    }

    #[test]
    fn byte_stream_endianness_sniffing() {
        let module = module_with(&[InstructionBuilder::new(Op::Nop).build()]);
        let le_bytes: Vec<u8> = module
            .words()
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect();
        let be_bytes: Vec<u8> = module
            .words()
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();
        assert_eq!(SpirvBinary::from(le_bytes).words(), module.words());
        assert_eq!(SpirvBinary::from(be_bytes).words(), module.words());
    }

    struct Counter {
        offsets: Vec<usize>,
    }
    impl Visitor for Counter {
        type Error = ParseError;
        fn header(&mut self, _: &SpirvHeader) -> Result<(), ParseError> {
            Ok(())
        }
        fn instruction(&mut self, at: usize, _: &Instr) -> Result<(), ParseError> {
            self.offsets.push(at);
            Ok(())
        }
    }

    #[test]
    fn parse_reports_instruction_offsets() {
        let module = module_with(&[
            InstructionBuilder::new(Op::Capability)
                .push(spirv::Capability::Shader as u32)
                .build(),
            InstructionBuilder::new(Op::Nop).build(),
        ]);
        let mut counter = Counter { offsets: Vec::new() };
        parse(module.words(), &mut counter).unwrap();
        assert_eq!(counter.offsets, vec![5, 7]);
    }
}
