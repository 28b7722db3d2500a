//! Parameter types and values shared by the directive parser, the renderer's
//! uniform writer, and collaborators that persist or edit parameter values.
//!
//! Types:
//!
//! - `BaseType` is the declared GLSL shape of a parameter (`color` is a `vec3`
//!   with a UI hint).
//! - `ParamValue` holds a scalar, vector, or array of either, mirroring the
//!   shape of a definition's default.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Color,
}

impl BaseType {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "vec2" => Some(Self::Vec2),
            "vec3" => Some(Self::Vec3),
            "vec4" => Some(Self::Vec4),
            "color" => Some(Self::Color),
            _ => None,
        }
    }

    /// Directive keyword, as written in `// @param` lines.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Color => "color",
        }
    }

    /// GLSL type emitted into the assembled program.
    pub fn glsl_type(self) -> &'static str {
        match self {
            Self::Color => "vec3",
            other => other.keyword(),
        }
    }

    pub fn components(self) -> usize {
        match self {
            Self::Int | Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 | Self::Color => 3,
            Self::Vec4 => 4,
        }
    }

    pub fn is_color(self) -> bool {
        matches!(self, Self::Color)
    }

    pub fn zero(self) -> ParamValue {
        ParamValue::from_components(self, &[])
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Array(Vec<ParamValue>),
}

impl ParamValue {
    /// Builds a scalar or vector of `base` shape; missing components are 0.
    pub fn from_components(base: BaseType, values: &[f64]) -> Self {
        let at = |index: usize| values.get(index).copied().unwrap_or(0.0) as f32;
        match base {
            BaseType::Int => Self::Int(values.first().copied().unwrap_or(0.0) as i32),
            BaseType::Float => Self::Float(at(0)),
            BaseType::Vec2 => Self::Vec2([at(0), at(1)]),
            BaseType::Vec3 | BaseType::Color => Self::Vec3([at(0), at(1), at(2)]),
            BaseType::Vec4 => Self::Vec4([at(0), at(1), at(2), at(3)]),
        }
    }

    /// True when `self` is a single scalar or vector of `base` shape.
    pub fn element_matches(&self, base: BaseType) -> bool {
        matches!(
            (self, base),
            (Self::Int(_), BaseType::Int)
                | (Self::Float(_), BaseType::Float)
                | (Self::Vec2(_), BaseType::Vec2)
                | (Self::Vec3(_), BaseType::Vec3 | BaseType::Color)
                | (Self::Vec4(_), BaseType::Vec4)
        )
    }

    /// True when `self` has exactly the shape of a definition.
    pub fn matches_shape(&self, base: BaseType, array_size: Option<usize>) -> bool {
        match (self, array_size) {
            (Self::Array(elements), Some(len)) => {
                elements.len() == len && elements.iter().all(|value| value.element_matches(base))
            }
            (Self::Array(_), None) | (_, Some(_)) => false,
            (value, None) => value.element_matches(base),
        }
    }

    /// Converts an element to `base` when the only mismatch is an integer
    /// written to a float parameter.
    pub fn coerce_element(self, base: BaseType) -> Option<Self> {
        match (self, base) {
            (Self::Int(value), BaseType::Float) => Some(Self::Float(value as f32)),
            (value, base) if value.element_matches(base) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ParamValue]> {
        match self {
            Self::Array(elements) => Some(elements),
            _ => None,
        }
    }
}
