use serde::{Deserialize, Serialize};

use crate::scan::{directive_body, is_identifier, next_word, split_description, tokenize, Item};
use crate::value::{BaseType, ParamValue};

pub const PARAM_KEYWORD: &str = "@param";

/// Largest array a `@param` may declare. Each element takes a 16-byte std140
/// slot, so one maximal array fills 16 KiB of the custom block.
pub const MAX_ARRAY_SIZE: usize = 1024;

/// One `// @param` declaration. Rebuilt from scratch on every parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub base_type: BaseType,
    pub array_size: Option<usize>,
    pub default: ParamValue,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub description: String,
}

impl ParameterDefinition {
    /// Member declaration emitted into the custom uniform block.
    pub fn declaration_text(&self) -> String {
        match self.array_size {
            Some(len) => format!("{} {}[{}];", self.base_type.glsl_type(), self.name, len),
            None => format!("{} {};", self.base_type.glsl_type(), self.name),
        }
    }

    pub fn default_value(&self) -> ParamValue {
        self.default.clone()
    }

    pub fn is_array(&self) -> bool {
        self.array_size.is_some()
    }

    /// Number of uniform slots this parameter occupies (array elements or 1).
    pub fn element_count(&self) -> usize {
        self.array_size.unwrap_or(1)
    }
}

/// Parses a single `// @param` line; `None` when the line is not a valid
/// parameter directive.
pub fn parse_param_line(line: &str) -> Option<ParameterDefinition> {
    let body = directive_body(line, PARAM_KEYWORD)?;
    let (body, description) = split_description(body);

    let (name, rest) = next_word(&body)?;
    if !is_identifier(name) {
        return None;
    }
    let (type_token, rest) = next_word(rest)?;
    let (base_type, array_size) = parse_type_token(type_token)?;
    let items = tokenize(rest)?;

    let arity = base_type.components();
    let mut default = None;
    let mut per_element: Option<Vec<ParamValue>> = None;
    let mut range = None;

    for item in items {
        match item {
            Item::Number(value) => {
                if arity == 1 && default.is_none() {
                    default = Some(ParamValue::from_components(base_type, &[value]));
                }
            }
            Item::Group(inner) => match Item::flat_numbers(&inner) {
                Some(numbers) => {
                    let is_default_shape = if arity == 1 {
                        numbers.len() == 1
                    } else {
                        numbers.len() == arity
                    };
                    if default.is_none() && per_element.is_none() && is_default_shape {
                        default = Some(ParamValue::from_components(base_type, &numbers));
                    } else if range.is_none() && numbers.len() == 2 {
                        range = Some((numbers[0] as f32, numbers[1] as f32));
                    }
                }
                None => {
                    if array_size.is_some() && per_element.is_none() {
                        per_element = Some(element_defaults(base_type, &inner));
                    }
                }
            },
        }
    }

    let element_default = default.unwrap_or_else(|| base_type.zero());
    let default = match array_size {
        None => element_default,
        Some(len) => {
            let elements = (0..len)
                .map(|index| {
                    per_element
                        .as_ref()
                        .and_then(|list| list.get(index).cloned())
                        .unwrap_or_else(|| element_default.clone())
                })
                .collect();
            ParamValue::Array(elements)
        }
    };

    Some(ParameterDefinition {
        name: name.to_string(),
        base_type,
        array_size,
        default,
        min: range.map(|(min, _)| min),
        max: range.map(|(_, max)| max),
        description: description.unwrap_or_default(),
    })
}

fn parse_type_token(token: &str) -> Option<(BaseType, Option<usize>)> {
    match token.split_once('[') {
        None => Some((BaseType::from_keyword(token)?, None)),
        Some((keyword, size)) => {
            let size = size.strip_suffix(']')?.trim().parse::<usize>().ok()?;
            if size == 0 || size > MAX_ARRAY_SIZE {
                return None;
            }
            Some((BaseType::from_keyword(keyword)?, Some(size)))
        }
    }
}

fn element_defaults(base_type: BaseType, items: &[Item]) -> Vec<ParamValue> {
    items
        .iter()
        .map(|item| match item {
            Item::Number(value) => ParamValue::from_components(base_type, &[*value]),
            Item::Group(inner) => {
                let numbers = Item::flat_numbers(inner).unwrap_or_default();
                ParamValue::from_components(base_type, &numbers)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_with_range_and_description() {
        let def = parse_param_line(r#"// @param speed float 1.0 [0.0, 2.0] "Speed""#).unwrap();
        assert_eq!(
            def,
            ParameterDefinition {
                name: "speed".into(),
                base_type: BaseType::Float,
                array_size: None,
                default: ParamValue::Float(1.0),
                min: Some(0.0),
                max: Some(2.0),
                description: "Speed".into(),
            }
        );
        assert_eq!(def.declaration_text(), "float speed;");
    }

    #[test]
    fn three_component_bracket_is_a_color_default() {
        let def = parse_param_line(r#"// @param tint color [1.0, 0.5, 0.0] "Tint""#).unwrap();
        assert_eq!(def.base_type, BaseType::Color);
        assert_eq!(def.default, ParamValue::Vec3([1.0, 0.5, 0.0]));
        assert_eq!(def.min, None);
        assert_eq!(def.max, None);
        assert_eq!(def.declaration_text(), "vec3 tint;");
    }

    #[test]
    fn nested_brackets_give_one_default_per_element() {
        let def = parse_param_line("// @param lights color[2] [[0.9,0.4,0.1],[0.2,0.6,0.7]]").unwrap();
        assert_eq!(def.array_size, Some(2));
        let elements = def.default.as_array().unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0], ParamValue::Vec3([0.9, 0.4, 0.1]));
        assert_eq!(elements[1], ParamValue::Vec3([0.2, 0.6, 0.7]));
        assert_ne!(elements[0], elements[1]);
        assert_eq!(def.declaration_text(), "vec3 lights[2];");
    }

    #[test]
    fn single_vector_default_is_broadcast_across_array() {
        let def = parse_param_line("// @param offsets vec2[3] [0.5, 0.25] [-1, 1]").unwrap();
        assert_eq!(
            def.default,
            ParamValue::Array(vec![ParamValue::Vec2([0.5, 0.25]); 3])
        );
        assert_eq!((def.min, def.max), (Some(-1.0), Some(1.0)));
    }

    #[test]
    fn vec2_takes_first_pair_as_default_and_second_as_range() {
        let def = parse_param_line("// @param center vec2 [0.5, 0.5] [0.0, 1.0]").unwrap();
        assert_eq!(def.default, ParamValue::Vec2([0.5, 0.5]));
        assert_eq!((def.min, def.max), (Some(0.0), Some(1.0)));
    }

    #[test]
    fn scalar_pair_without_default_is_a_range() {
        let def = parse_param_line("// @param gain float [0, 4]").unwrap();
        assert_eq!(def.default, ParamValue::Float(0.0));
        assert_eq!((def.min, def.max), (Some(0.0), Some(4.0)));
    }

    #[test]
    fn int_defaults_truncate_and_garbage_reads_as_zero() {
        let def = parse_param_line("// @param steps int 7.8 [1, x]").unwrap();
        assert_eq!(def.default, ParamValue::Int(7));
        assert_eq!((def.min, def.max), (Some(1.0), Some(0.0)));
    }

    #[test]
    fn short_per_element_list_falls_back_to_broadcast_default() {
        let def = parse_param_line("// @param w float[3] 0.5 [[1.0], [2.0]]").unwrap();
        assert_eq!(
            def.default,
            ParamValue::Array(vec![
                ParamValue::Float(1.0),
                ParamValue::Float(2.0),
                ParamValue::Float(0.5),
            ])
        );
    }

    #[test]
    fn rejects_unknown_types_bad_names_and_bad_arrays() {
        assert!(parse_param_line("// @param speed double 1.0").is_none());
        assert!(parse_param_line("// @param 9lives float 1.0").is_none());
        assert!(parse_param_line("// @param a float[0] 1.0").is_none());
        assert!(parse_param_line("// @param a float[x] 1.0").is_none());
        assert!(parse_param_line("// @param a float [1.0").is_none());
        assert!(parse_param_line("// @param onlyname").is_none());
        assert!(parse_param_line("float speed = 1.0;").is_none());
    }

    #[test]
    fn oversized_arrays_are_dropped() {
        assert!(parse_param_line("// @param big float[50000000] \"x\"").is_none());
        assert!(parse_param_line("// @param big float[18446744073709551615]").is_none());
        let largest = parse_param_line(&format!("// @param ok vec4[{MAX_ARRAY_SIZE}]")).unwrap();
        assert_eq!(largest.element_count(), MAX_ARRAY_SIZE);
        assert!(parse_param_line(&format!("// @param no vec4[{}]", MAX_ARRAY_SIZE + 1)).is_none());
    }

    #[test]
    fn missing_default_uses_zero_of_the_right_shape() {
        let def = parse_param_line("// @param dir vec4").unwrap();
        assert_eq!(def.default, ParamValue::Vec4([0.0; 4]));
        assert_eq!(def.description, "");
    }
}
