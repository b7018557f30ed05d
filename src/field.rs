//! Field descriptors for node kinds.
//!
//! Node kinds are plain-old-data structs. Every field that can be seeded by
//! a slot value or wired by a route is described by a [`FieldDesc`]: its
//! name, byte offset and [`FieldKind`]. The kind is derived from the Rust
//! field type through [`FieldType`], so a layout change can never silently
//! desynchronise the descriptor table from the struct.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Value category of a node field. Routes and slot values only connect
/// fields of the same kind; there is no implicit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    F32,
    F64,
    I32,
    U32,
    Vec2,
    Color,
    Name,
}

impl FieldKind {
    pub const fn size(self) -> usize {
        match self {
            FieldKind::F32 | FieldKind::I32 | FieldKind::U32 => 4,
            FieldKind::F64 | FieldKind::Vec2 => 8,
            FieldKind::Color => 16,
            FieldKind::Name => InlineName::CAPACITY,
        }
    }

    /// Parses the textual form used by level files into field bytes.
    pub fn parse(self, text: &str) -> Result<Vec<u8>, String> {
        let text = text.trim();
        let bytes = match self {
            FieldKind::F32 => bytemuck::bytes_of(&parse_number::<f32>(text)?).to_vec(),
            FieldKind::F64 => bytemuck::bytes_of(&parse_number::<f64>(text)?).to_vec(),
            FieldKind::I32 => bytemuck::bytes_of(&parse_number::<i32>(text)?).to_vec(),
            FieldKind::U32 => bytemuck::bytes_of(&parse_number::<u32>(text)?).to_vec(),
            FieldKind::Vec2 => {
                let [x, y] = parse_components::<2>(text, "vector")?;
                bytemuck::bytes_of(&Vec2::new(x, y)).to_vec()
            }
            FieldKind::Color => {
                let components: Vec<f32> = text
                    .split_whitespace()
                    .map(|c| c.parse::<f32>().map_err(|err| format!("{c}: {err}")))
                    .collect::<Result<_, _>>()?;
                let rgba = match components.as_slice() {
                    [r, g, b] => [*r, *g, *b, 255.0],
                    [r, g, b, a] => [*r, *g, *b, *a],
                    _ => return Err("color needs 3 or 4 components".to_string()),
                };
                bytemuck::bytes_of(&rgba.map(|c| c / 255.0)).to_vec()
            }
            FieldKind::Name => {
                let name = InlineName::try_new(text).ok_or_else(|| {
                    format!("name is longer than {} bytes", InlineName::CAPACITY)
                })?;
                bytemuck::bytes_of(&name).to_vec()
            }
        };
        Ok(bytes)
    }

    /// Human readable rendering of field bytes, used by state dumps.
    pub fn format(self, bytes: &[u8]) -> String {
        if bytes.len() != self.size() {
            return format!("<{} bytes>", bytes.len());
        }
        match self {
            FieldKind::F32 => format!("{:.2}", bytemuck::pod_read_unaligned::<f32>(bytes)),
            FieldKind::F64 => format!("{:.2}", bytemuck::pod_read_unaligned::<f64>(bytes)),
            FieldKind::I32 => bytemuck::pod_read_unaligned::<i32>(bytes).to_string(),
            FieldKind::U32 => bytemuck::pod_read_unaligned::<u32>(bytes).to_string(),
            FieldKind::Vec2 => {
                let v = bytemuck::pod_read_unaligned::<Vec2>(bytes);
                format!("({:.2}, {:.2})", v.x, v.y)
            }
            FieldKind::Color => {
                let [r, g, b, a] = bytemuck::pod_read_unaligned::<[f32; 4]>(bytes);
                format!("({r:.2}, {g:.2}, {b:.2}, {a:.2})")
            }
            FieldKind::Name => bytemuck::pod_read_unaligned::<InlineName>(bytes).to_string(),
        }
    }
}

fn parse_number<T>(text: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    text.parse::<T>().map_err(|err| format!("{text}: {err}"))
}

fn parse_components<const N: usize>(text: &str, what: &str) -> Result<[f32; N], String> {
    let mut out = [0.0; N];
    let mut numbers = text.split_whitespace();
    for slot in out.iter_mut() {
        let component = numbers
            .next()
            .ok_or_else(|| format!("{what} is missing components"))?;
        *slot = parse_number(component)?;
    }
    if numbers.next().is_some() {
        return Err(format!("{what} has more than {N} components"));
    }
    Ok(out)
}

/// Rust types that may appear as described node fields.
pub trait FieldType: Pod {
    const KIND: FieldKind;
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::F32;
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::F64;
}

impl FieldType for i32 {
    const KIND: FieldKind = FieldKind::I32;
}

impl FieldType for u32 {
    const KIND: FieldKind = FieldKind::U32;
}

impl FieldType for Vec2 {
    const KIND: FieldKind = FieldKind::Vec2;
}

impl FieldType for [f32; 4] {
    const KIND: FieldKind = FieldKind::Color;
}

impl FieldType for InlineName {
    const KIND: FieldKind = FieldKind::Name;
}

/// Name, offset and kind of one field inside a node kind's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

impl FieldDesc {
    /// Builds a descriptor whose kind is taken from the type the probe
    /// projects to. Use through [`node_fields!`](crate::node_fields).
    pub fn of<T, F: FieldType>(name: &'static str, offset: usize, _probe: fn(&T) -> &F) -> Self {
        debug_assert_eq!(std::mem::size_of::<F>(), F::KIND.size());
        Self {
            name,
            offset,
            kind: F::KIND,
        }
    }

    pub const fn size(&self) -> usize {
        self.kind.size()
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size()
    }
}

/// Declares the described fields of a node kind.
///
/// ```ignore
/// fn fields() -> Vec<FieldDesc> {
///     node_fields!(Dot { x, y })
/// }
/// ```
#[macro_export]
macro_rules! node_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        vec![$(
            $crate::field::FieldDesc::of::<$ty, _>(
                stringify!($field),
                ::std::mem::offset_of!($ty, $field),
                |node: &$ty| &node.$field,
            )
        ),*]
    };
}

/// Fixed-size, NUL padded UTF-8 name that can live inside a POD node.
///
/// Names are the stable identity a node keeps across a reload; anything
/// derived from them (resource ids, backend handles) is recomputed.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct InlineName([u8; InlineName::CAPACITY]);

impl InlineName {
    pub const CAPACITY: usize = 32;

    /// Returns `None` when `name` does not fit.
    pub fn try_new(name: &str) -> Option<Self> {
        if name.len() > Self::CAPACITY {
            return None;
        }
        let mut bytes = [0u8; Self::CAPACITY];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Some(Self(bytes))
    }

    /// Truncates on a character boundary when `name` is too long.
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(Self::CAPACITY);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self::try_new(&name[..end]).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(Self::CAPACITY);
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl Default for InlineName {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for InlineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for InlineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial value for one field of one group member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotVal {
    pub role: String,
    pub field: String,
    pub value: SlotValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotValue {
    /// Bytes of a Rust value together with the kind they were built from.
    Typed { kind: FieldKind, bytes: Vec<u8> },
    /// Textual value parsed against the destination field's kind.
    Text(String),
}

impl SlotVal {
    pub fn new<F: FieldType>(role: impl Into<String>, field: impl Into<String>, value: F) -> Self {
        Self {
            role: role.into(),
            field: field.into(),
            value: SlotValue::Typed {
                kind: F::KIND,
                bytes: bytemuck::bytes_of(&value).to_vec(),
            },
        }
    }

    pub fn text(
        role: impl Into<String>,
        field: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            field: field.into(),
            value: SlotValue::Text(text.into()),
        }
    }

    /// Produces the bytes to store into `desc`, rejecting any kind change.
    pub fn encode(&self, desc: &FieldDesc) -> NodeResult<Vec<u8>> {
        let target = format!("{}.{}", self.role, self.field);
        match &self.value {
            SlotValue::Typed { kind, bytes } => {
                if *kind != desc.kind {
                    return Err(NodeError::FieldKindMismatch {
                        target,
                        expected: desc.kind,
                        found: *kind,
                    });
                }
                if bytes.len() != desc.size() {
                    return Err(NodeError::InvalidValue {
                        target,
                        reason: format!("{} bytes for a {}-byte field", bytes.len(), desc.size()),
                    });
                }
                Ok(bytes.clone())
            }
            SlotValue::Text(text) => desc
                .kind
                .parse(text)
                .map_err(|reason| NodeError::InvalidValue { target, reason }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Pod, Zeroable)]
    struct Probe {
        speed: f32,
        position: Vec2,
        tint: [f32; 4],
        label: InlineName,
    }

    #[test]
    fn field_table_follows_struct_layout() {
        let fields = node_fields!(Probe { speed, position, tint, label });
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].kind, FieldKind::F32);
        assert_eq!(fields[1].offset, 4);
        assert_eq!(fields[1].kind, FieldKind::Vec2);
        assert_eq!(fields[2].range(), 12..28);
        assert_eq!(fields[3].kind, FieldKind::Name);
        assert_eq!(fields[3].range().end, std::mem::size_of::<Probe>());
    }

    #[test]
    fn colors_are_parsed_as_bytes_like_authoring_tools() {
        let bytes = FieldKind::Color.parse("255 0 51").unwrap();
        let rgba: [f32; 4] = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(rgba, [1.0, 0.0, 0.2, 1.0]);
    }

    #[test]
    fn vectors_need_exactly_two_components() {
        assert!(FieldKind::Vec2.parse("1").is_err());
        assert!(FieldKind::Vec2.parse("1 2 3").is_err());
        let bytes = FieldKind::Vec2.parse(" 1.5 -2 ").unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<Vec2>(&bytes), Vec2::new(1.5, -2.0));
    }

    #[test]
    fn inline_names_truncate_on_char_boundaries() {
        let long = "é".repeat(20);
        let name = InlineName::new(&long);
        assert_eq!(name.as_str().chars().count(), 16);
        assert!(InlineName::try_new(&long).is_none());
        assert_eq!(InlineName::new("walk").to_string(), "walk");
        assert!(InlineName::default().is_empty());
    }

    #[test]
    fn typed_values_keep_their_kind() {
        let desc = FieldDesc {
            name: "x",
            offset: 0,
            kind: FieldKind::F64,
        };
        let ok = SlotVal::new("body", "x", 3.0f64);
        assert_eq!(ok.encode(&desc).unwrap(), 3.0f64.to_ne_bytes().to_vec());

        let wrong = SlotVal::new("body", "x", 3u32);
        assert!(matches!(
            wrong.encode(&desc),
            Err(NodeError::FieldKindMismatch { .. })
        ));

        let text = SlotVal::text("body", "x", "not a number");
        assert!(matches!(
            text.encode(&desc),
            Err(NodeError::InvalidValue { .. })
        ));
    }
}
