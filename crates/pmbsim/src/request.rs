//! Command line syntax for boot slots, mapping requests, and memory regions.

use std::fmt;
use std::str::FromStr;

use pmb::{CachePolicy, MemoryRegion, PhysicalAddress, SizeClass, VirtualAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The text is not a number.
    Number(String),
    /// The number does not fit in a 32-bit address.
    AddressRange(usize),
    /// A boot slot size that no single slot can map.
    BlockSize(usize),
    /// The text does not follow the expected `A=B:C` shape.
    Syntax(&'static str),
    /// An unknown trailing attribute.
    Attribute(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Number(text) => write!(f, "'{}' is not a number", text),
            ParseError::AddressRange(value) => {
                write!(f, "{:#x} does not fit in a 32-bit address", value)
            }
            ParseError::BlockSize(value) => write!(
                f,
                "{:#x} is not a block size (16M, 64M, 128M or 512M)",
                value
            ),
            ParseError::Syntax(expected) => write!(f, "expected {}", expected),
            ParseError::Attribute(text) => write!(f, "unknown attribute '{}'", text),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a decimal or `0x` hexadecimal number with an optional `K`, `M`, or `G` suffix.
pub fn parse_number(text: &str) -> Result<usize, ParseError> {
    let invalid = || ParseError::Number(text.to_string());

    let (digits, shift) = match text.as_bytes().last() {
        Some(b'K' | b'k') => (&text[..text.len() - 1], 10),
        Some(b'M' | b'm') => (&text[..text.len() - 1], 20),
        Some(b'G' | b'g') => (&text[..text.len() - 1], 30),
        _ => (text, 0),
    };

    let digits = digits.replace('_', "");
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => digits.parse::<usize>().map_err(|_| invalid())?,
    };
    value.checked_mul(1 << shift).ok_or_else(invalid)
}

fn parse_address(text: &str) -> Result<usize, ParseError> {
    let value = parse_number(text)?;
    if value > u32::MAX as usize {
        return Err(ParseError::AddressRange(value));
    }
    Ok(value)
}

fn parse_policy(attribute: Option<&str>) -> Result<CachePolicy, ParseError> {
    match attribute {
        None | Some("c") => Ok(CachePolicy::Cached),
        Some("uc") => Ok(CachePolicy::Uncached),
        Some(other) => Err(ParseError::Attribute(other.to_string())),
    }
}

/// Splits `VIRT=PHYS:LEN[:ATTR]`.
fn split_mapping(text: &str) -> Result<(&str, &str, &str, Option<&str>), ParseError> {
    const SHAPE: &str = "VIRT=PHYS:LEN[:uc]";

    let (virt, rest) = text.split_once('=').ok_or(ParseError::Syntax(SHAPE))?;
    let mut fields = rest.split(':');
    let phys = fields.next().ok_or(ParseError::Syntax(SHAPE))?;
    let length = fields.next().ok_or(ParseError::Syntax(SHAPE))?;
    let attribute = fields.next();
    if fields.next().is_some() {
        return Err(ParseError::Syntax(SHAPE));
    }
    Ok((virt, phys, length, attribute))
}

/// A `--remap VIRT=PHYS:LEN[:uc]` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapRequest {
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub length: usize,
    pub policy: CachePolicy,
}

impl RemapRequest {
    /// Returns the length counted from the page-aligned virtual base, or `None` if it
    /// does not fit in a `usize`.
    pub fn aligned_length(&self) -> Option<usize> {
        self.length.checked_add(self.virt.page_offset())
    }
}

impl FromStr for RemapRequest {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (virt, phys, length, attribute) = split_mapping(text)?;
        Ok(Self {
            virt: VirtualAddress::new(parse_address(virt)?),
            phys: PhysicalAddress::new(parse_address(phys)?),
            length: parse_number(length)?,
            policy: parse_policy(attribute)?,
        })
    }
}

/// A `--boot VIRT=PHYS:SIZE[:uc]` mapping preloaded into the emulated hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSlot {
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub size: SizeClass,
    pub policy: CachePolicy,
}

impl FromStr for BootSlot {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (virt, phys, size, attribute) = split_mapping(text)?;
        let size = parse_number(size)?;
        Ok(Self {
            virt: VirtualAddress::new(parse_address(virt)?),
            phys: PhysicalAddress::new(parse_address(phys)?),
            size: SizeClass::exact(size).ok_or(ParseError::BlockSize(size))?,
            policy: parse_policy(attribute)?,
        })
    }
}

/// A `--memory BASE:SIZE` system memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryArg(pub MemoryRegion);

impl FromStr for MemoryArg {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (base, size) = text
            .split_once(':')
            .ok_or(ParseError::Syntax("BASE:SIZE"))?;
        let base = parse_address(base)?;
        let size = parse_number(size)?;
        let end = base
            .checked_add(size)
            .filter(|&end| end <= u32::MAX as usize + 1)
            .ok_or(ParseError::AddressRange(size))?;
        if end == base {
            return Err(ParseError::Syntax("a non-empty SIZE"));
        }
        Ok(Self(MemoryRegion::new(PhysicalAddress::new(base), size)))
    }
}
