//! Variable catalog: the static arena of variable and frame descriptors.
//!
//! Built once at startup, read-only afterwards. Frames hold the global indices
//! of their variables, variables hold the index of their frame; there are no
//! back-pointers, so the whole catalog can be shared behind a plain `Arc`.

use hashbrown::HashMap;
use thiserror::Error;

/// Dense, process-wide variable index.
pub type VarId = usize;

/// Index of a frame inside the catalog.
pub type FrameId = usize;

/// RGBA display color.
pub type Rgba = [u8; 4];

/// Slot of a frame message that carries the source timestamp.
pub const TIMESTAMP_SLOT: usize = 1;

/// Fallback palette (colorbrewer paired + set3), cycled by global index.
pub const PALETTE: [Rgba; 24] = [
    [166, 206, 227, 255],
    [31, 120, 180, 255],
    [178, 223, 138, 255],
    [51, 160, 44, 255],
    [251, 154, 153, 255],
    [227, 26, 28, 255],
    [253, 191, 111, 255],
    [255, 127, 0, 255],
    [202, 178, 214, 255],
    [106, 61, 154, 255],
    [255, 255, 153, 255],
    [177, 89, 40, 255],
    [141, 211, 199, 255],
    [255, 255, 179, 255],
    [190, 186, 218, 255],
    [251, 128, 114, 255],
    [128, 177, 211, 255],
    [253, 180, 98, 255],
    [179, 222, 105, 255],
    [252, 205, 229, 255],
    [217, 217, 217, 255],
    [188, 128, 189, 255],
    [204, 235, 197, 255],
    [255, 237, 111, 255],
];

/// Deterministic color for a variable without an explicit one.
pub fn palette_color(global_index: VarId) -> Rgba {
    PALETTE[global_index % PALETTE.len()]
}

/// Parse `#rrggbb` (or `rrggbb`) into an opaque color.
pub fn parse_hex_color(text: &str) -> Option<Rgba> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?, 255])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Plain analog value, passed through untouched.
    Continuous,
    /// Boolean-like channel, quantized to {0, 1} on ingestion.
    Signal,
}

impl ValueKind {
    /// Anything not declared as `"float"` is treated as a signal.
    pub fn from_data_type(data_type: &str) -> Self {
        if data_type == "float" {
            ValueKind::Continuous
        } else {
            ValueKind::Signal
        }
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ValueKind::Signal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub global_index: VarId,
    pub frame: FrameId,
    pub local_index: usize,
    pub kind: ValueKind,
    pub color: Rgba,
    pub uuid: String,
    pub name: String,
    pub legend: String,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    /// Topic the frame is published on; doubles as the frame name.
    pub topic: String,
    /// Global indices, sorted by local index (so `variables[i]` is local slot `i`).
    pub variables: Vec<VarId>,
    /// Local slots holding signal-kind variables.
    pub signal_slots: Vec<usize>,
}

impl FrameDescriptor {
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Input record for [`CatalogBuilder`].
#[derive(Debug, Clone, Default)]
pub struct VariableSpec {
    pub uuid: String,
    pub name: String,
    pub topic: String,
    pub local_index: usize,
    pub data_type: String,
    pub color: Option<String>,
    pub legend: String,
    pub source_id: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate variable uuid {0:?}")]
    DuplicateUuid(String),
    #[error("frame {topic:?} declares local index {index} twice")]
    DuplicateLocalIndex { topic: String, index: usize },
    #[error("frame {topic:?} local indices are not dense: expected {expected}, found {found}")]
    SparseLocalIndices {
        topic: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown variable uuid {0:?}")]
    UnknownUuid(String),
    #[error("unknown variable index {0}")]
    UnknownVariable(VarId),
    #[error("variables do not share a common frame ({first:?} vs {other:?})")]
    NoCommonFrame { first: String, other: String },
    #[error("empty variable list")]
    Empty,
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    specs: Vec<VariableSpec>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the next variable; its global index is its declaration order.
    pub fn variable(mut self, spec: VariableSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn push(&mut self, spec: VariableSpec) {
        self.specs.push(spec);
    }

    pub fn build(self) -> Result<Catalog, CatalogError> {
        let mut variables = Vec::with_capacity(self.specs.len());
        let mut frames: Vec<FrameDescriptor> = Vec::new();
        let mut by_topic: HashMap<String, FrameId> = HashMap::new();
        let mut by_uuid: HashMap<String, VarId> = HashMap::new();

        for (global_index, spec) in self.specs.into_iter().enumerate() {
            if by_uuid.insert(spec.uuid.clone(), global_index).is_some() {
                return Err(CatalogError::DuplicateUuid(spec.uuid));
            }

            let frame = *by_topic.entry(spec.topic.clone()).or_insert_with(|| {
                frames.push(FrameDescriptor {
                    topic: spec.topic.clone(),
                    variables: Vec::new(),
                    signal_slots: Vec::new(),
                });
                frames.len() - 1
            });
            frames[frame].variables.push(global_index);

            let color = spec
                .color
                .as_deref()
                .and_then(parse_hex_color)
                .unwrap_or_else(|| palette_color(global_index));

            variables.push(VariableDescriptor {
                global_index,
                frame,
                local_index: spec.local_index,
                kind: ValueKind::from_data_type(&spec.data_type),
                color,
                uuid: spec.uuid,
                name: if spec.name.is_empty() {
                    "Unnamed".to_string()
                } else {
                    spec.name
                },
                legend: spec.legend,
                source_id: spec.source_id,
            });
        }

        for frame in &mut frames {
            frame
                .variables
                .sort_by_key(|&id| variables[id].local_index);

            for (expected, &id) in frame.variables.iter().enumerate() {
                let found = variables[id].local_index;
                if found == expected {
                    continue;
                }
                if expected > 0 && variables[frame.variables[expected - 1]].local_index == found {
                    return Err(CatalogError::DuplicateLocalIndex {
                        topic: frame.topic.clone(),
                        index: found,
                    });
                }
                return Err(CatalogError::SparseLocalIndices {
                    topic: frame.topic.clone(),
                    expected,
                    found,
                });
            }

            frame.signal_slots = frame
                .variables
                .iter()
                .filter(|&&id| variables[id].kind.is_signal())
                .map(|&id| variables[id].local_index)
                .collect();
        }

        Ok(Catalog {
            variables,
            frames,
            by_uuid,
            by_topic,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    variables: Vec<VariableDescriptor>,
    frames: Vec<FrameDescriptor>,
    by_uuid: HashMap<String, VarId>,
    by_topic: HashMap<String, FrameId>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    pub fn variable(&self, id: VarId) -> Option<&VariableDescriptor> {
        self.variables.get(id)
    }

    pub fn frame(&self, id: FrameId) -> Option<&FrameDescriptor> {
        self.frames.get(id)
    }

    pub fn frame_by_topic(&self, topic: &str) -> Option<FrameId> {
        self.by_topic.get(topic).copied()
    }

    pub fn lookup_uuid(&self, uuid: &str) -> Option<VarId> {
        self.by_uuid.get(uuid).copied()
    }

    /// uuid → global index, for the stream welcome payload.
    pub fn uuid_mapping(&self) -> impl Iterator<Item = (&str, VarId)> + '_ {
        self.variables
            .iter()
            .map(|v| (v.uuid.as_str(), v.global_index))
    }

    pub fn color(&self, id: VarId) -> Result<Rgba, CatalogError> {
        self.variable(id)
            .map(|v| v.color)
            .ok_or(CatalogError::UnknownVariable(id))
    }

    /// The single frame every listed variable belongs to.
    pub fn common_frame(&self, ids: &[VarId]) -> Result<FrameId, CatalogError> {
        let (&first, rest) = ids.split_first().ok_or(CatalogError::Empty)?;
        let frame = self
            .variable(first)
            .ok_or(CatalogError::UnknownVariable(first))?
            .frame;

        for &id in rest {
            let other = self.variable(id).ok_or(CatalogError::UnknownVariable(id))?;
            if other.frame != frame {
                return Err(CatalogError::NoCommonFrame {
                    first: self.frames[frame].topic.clone(),
                    other: self.frames[other.frame].topic.clone(),
                });
            }
        }
        Ok(frame)
    }
}
