//! Instruction-level access to a SPIR-V word stream.
use spirv::Op;
use std::{borrow::Borrow, fmt, ops::Deref};

use crate::error::{ParseError, Result};

/// Bridges the inherent `from_u32` constructors generated on `spirv` crate
/// enums to a local trait so they can be used generically by `read_enum`.
pub trait FromPrimitive: Sized {
    fn from_u32(n: u32) -> Option<Self>;
}

macro_rules! impl_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromPrimitive for $ty {
                fn from_u32(n: u32) -> Option<Self> {
                    <$ty>::from_u32(n)
                }
            }
        )*
    };
}

impl_from_primitive!(
    spirv::AddressingModel,
    spirv::MemoryModel,
    spirv::ExecutionModel,
    spirv::ExecutionMode,
    spirv::Capability,
    spirv::Decoration,
    spirv::StorageClass,
);

/// Cursor over the instruction section of a SPIR-V binary.
///
/// Yields `(instruction_start_index, instruction)` pairs where the index is
/// the word offset of the instruction's first word within the whole binary,
/// header included.
pub struct Instrs<'a> {
    words: &'a [u32],
    offset: usize,
}
impl<'a> Instrs<'a> {
    /// `base_offset` is the word offset of `words[0]` within the binary; for
    /// a stream that starts right after the header this is 5.
    pub fn new(words: &'a [u32], base_offset: usize) -> Self {
        Instrs {
            words,
            offset: base_offset,
        }
    }

    pub fn next(&mut self) -> Result<Option<(usize, &'a Instr)>> {
        let head = match self.words.first() {
            Some(head) => *head,
            None => return Ok(None),
        };
        let len = (head >> 16) as usize;
        if len == 0 {
            return Err(ParseError::new(self.offset, "instruction word count is zero"));
        }
        if len > self.words.len() {
            return Err(ParseError::new(self.offset, "instruction is truncated"));
        }
        let instr = Instr::new(&self.words[..len], self.offset)?;
        let at = self.offset;
        self.words = &self.words[len..];
        self.offset += len;
        Ok(Some((at, instr)))
    }
}

/// A single borrowed instruction: opcode word followed by its operands.
pub struct Instr {
    inner: [u32],
}
impl Instr {
    pub fn new(words: &[u32], at: usize) -> Result<&Instr> {
        if words.is_empty() {
            return Err(ParseError::new(at, "instruction is too short"));
        }
        // `Instr` is a transparent unsized view over the word slice.
        Ok(unsafe { std::mem::transmute::<&[u32], &Instr>(words) })
    }

    /// Raw 16-bit opcode.
    pub fn opcode(&self) -> u32 {
        self.inner[0] & 0xFFFF
    }
    /// Decoded opcode; `None` for opcodes outside the known set.
    pub fn op(&self) -> Option<Op> {
        Op::from_u32(self.opcode())
    }
    /// Word count including the opcode word.
    pub fn word_count(&self) -> usize {
        self.inner.len()
    }
    /// Operand cursor. `at` is this instruction's start offset and is used to
    /// blame decode errors.
    pub fn operands(&self, at: usize) -> Operands<'_> {
        Operands {
            words: &self.inner[1..],
            at,
        }
    }
}
impl AsRef<[u32]> for Instr {
    fn as_ref(&self) -> &[u32] {
        &self.inner
    }
}
impl ToOwned for Instr {
    type Owned = Instruction;
    fn to_owned(&self) -> Instruction {
        Instruction::from(&self.inner)
    }
}
impl fmt::Debug for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "{:?} {:?}", op, &self.inner[1..]),
            None => write!(f, "Op({}) {:?}", self.opcode(), &self.inner[1..]),
        }
    }
}

/// An owned instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    inner: Vec<u32>,
}
impl From<Vec<u32>> for Instruction {
    fn from(words: Vec<u32>) -> Instruction {
        Instruction { inner: words }
    }
}
impl From<&[u32]> for Instruction {
    fn from(words: &[u32]) -> Instruction {
        Instruction::from(words.to_owned())
    }
}
impl AsRef<[u32]> for Instruction {
    fn as_ref(&self) -> &[u32] {
        &self.inner
    }
}
impl Borrow<Instr> for Instruction {
    fn borrow(&self) -> &Instr {
        Instr::new(&self.inner, 0).unwrap()
    }
}
impl Deref for Instruction {
    type Target = Instr;
    fn deref(&self) -> &Instr {
        self.borrow()
    }
}

/// Builds a single instruction's words. Used by the test suites to assemble
/// shader binaries without a front-end compiler.
pub struct InstructionBuilder {
    inner: Vec<u32>,
}
impl InstructionBuilder {
    pub fn new(op: Op) -> InstructionBuilder {
        InstructionBuilder {
            inner: vec![(op as u32) & 0xFFFF],
        }
    }
    pub fn push(mut self, word: u32) -> Self {
        self.inner.push(word);
        self
    }
    pub fn push_list(mut self, words: &[u32]) -> Self {
        self.inner.extend_from_slice(words);
        self
    }
    pub fn push_f32(self, value: f32) -> Self {
        self.push(value.to_bits())
    }
    /// Encodes a nul-terminated string operand padded to a word boundary.
    pub fn push_str(mut self, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        for chunk in bytes.chunks_exact(4) {
            self.inner
                .push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        self
    }
    pub fn build(mut self) -> Instruction {
        self.inner[0] |= (self.inner.len() as u32) << 16;
        Instruction::from(self.inner)
    }
}

/// Operand cursor. Does its own bounds checking; every read failure is blamed
/// on the owning instruction's start offset.
pub struct Operands<'a> {
    words: &'a [u32],
    at: usize,
}
impl<'a> Operands<'a> {
    pub fn len(&self) -> usize {
        self.words.len()
    }
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        match self.words.first() {
            Some(word) => {
                self.words = &self.words[1..];
                Ok(*word)
            }
            None => Err(ParseError::new(self.at, "instruction is missing an operand")),
        }
    }
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u32().map(|word| word != 0)
    }
    pub fn read_id(&mut self) -> Result<u32> {
        let id = self.read_u32()?;
        if id == 0 {
            return Err(ParseError::new(self.at, "id operand is zero"));
        }
        Ok(id)
    }
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }
    /// Reads a trailing optional word.
    pub fn read_opt_u32(&mut self) -> Result<Option<u32>> {
        if self.words.is_empty() {
            Ok(None)
        } else {
            self.read_u32().map(Some)
        }
    }
    /// Reads a trailing optional id.
    pub fn read_opt_id(&mut self) -> Result<Option<u32>> {
        if self.words.is_empty() {
            Ok(None)
        } else {
            self.read_id().map(Some)
        }
    }
    pub fn read_enum<E: FromPrimitive>(&mut self) -> Result<E> {
        let word = self.read_u32()?;
        E::from_u32(word).ok_or_else(|| {
            ParseError::new(self.at, format!("unencoded enumeration value {}", word))
        })
    }
    /// Reads a nul-terminated string operand and advances past its padding.
    pub fn read_str(&mut self) -> Result<&'a str> {
        let mut nul_word = None;
        'words: for (i, word) in self.words.iter().enumerate() {
            for byte in word.to_le_bytes() {
                if byte == 0 {
                    nul_word = Some(i);
                    break 'words;
                }
            }
        }
        let nul_word = nul_word
            .ok_or_else(|| ParseError::new(self.at, "string operand is not nul-terminated"))?;
        let raw = &self.words[..=nul_word];
        self.words = &self.words[nul_word + 1..];
        // The words are little-endian byte quads; reborrow them as bytes.
        let bytes =
            unsafe { std::slice::from_raw_parts(raw.as_ptr() as *const u8, raw.len() * 4) };
        let end = bytes.iter().position(|byte| *byte == 0).unwrap();
        std::str::from_utf8(&bytes[..end])
            .map_err(|_| ParseError::new(self.at, "string operand is not valid UTF-8"))
    }
    /// Consumes the remaining operand words.
    pub fn read_list(&mut self) -> Result<&'a [u32]> {
        let rest = self.words;
        self.words = &[];
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_roundtrip() {
        let instr = InstructionBuilder::new(Op::Name)
            .push(42)
            .push_str("position")
            .build();
        assert_eq!(instr.op(), Some(Op::Name));
        let mut operands = instr.operands(0);
        assert_eq!(operands.read_u32().unwrap(), 42);
        assert_eq!(operands.read_str().unwrap(), "position");
        assert!(operands.is_empty());
    }

    #[test]
    fn string_padding_is_word_aligned() {
        for text in ["", "a", "ab", "abc", "abcd", "main"] {
            let instr = InstructionBuilder::new(Op::Name).push(1).push_str(text).build();
            let mut operands = instr.operands(0);
            operands.read_u32().unwrap();
            assert_eq!(operands.read_str().unwrap(), text);
            assert!(operands.is_empty(), "{:?} left operand words behind", text);
        }
    }

    #[test]
    fn zero_length_instruction_is_rejected() {
        let words = [0u32];
        let mut instrs = Instrs::new(&words, 5);
        let err = instrs.next().unwrap_err();
        assert_eq!(err.word_index, 5);
    }

    #[test]
    fn truncated_instruction_is_rejected() {
        // Word count claims 4 but only 2 words are present.
        let words = [(4 << 16) | Op::Name as u32, 1];
        let mut instrs = Instrs::new(&words, 5);
        assert!(instrs.next().is_err());
    }

    #[test]
    fn offsets_accumulate() {
        let a = InstructionBuilder::new(Op::Nop).build();
        let b = InstructionBuilder::new(Op::Name).push(1).push_str("x").build();
        let mut words = Vec::new();
        words.extend_from_slice(a.as_ref());
        words.extend_from_slice(b.as_ref());
        let mut instrs = Instrs::new(&words, 5);
        let (at_a, _) = instrs.next().unwrap().unwrap();
        let (at_b, _) = instrs.next().unwrap().unwrap();
        assert_eq!(at_a, 5);
        assert_eq!(at_b, 5 + a.as_ref().len());
        assert!(instrs.next().unwrap().is_none());
    }
}
