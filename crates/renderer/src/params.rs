use directives::{create_default_values, ParamValue, ParameterDefinition, ParameterValues};

use crate::error::ParameterError;

/// Definitions of the active program and the values collaborators edit.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParameterStore {
    defs: Vec<ParameterDefinition>,
    values: ParameterValues,
}

impl ParameterStore {
    pub fn new(defs: Vec<ParameterDefinition>) -> Self {
        let values = create_default_values(&defs);
        Self { defs, values }
    }

    pub fn definitions(&self) -> &[ParameterDefinition] {
        &self.defs
    }

    pub fn values(&self) -> &ParameterValues {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Type-checked write. `index` addresses one array element; `None`
    /// replaces the whole value. Integers are accepted for float slots.
    pub fn set(
        &mut self,
        name: &str,
        index: Option<usize>,
        value: ParamValue,
    ) -> Result<(), ParameterError> {
        let def = self
            .defs
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| ParameterError::Unknown {
                name: name.to_string(),
            })?;
        let mismatch = || ParameterError::ShapeMismatch {
            name: name.to_string(),
            expected: expected_shape(def),
        };
        let len = def.element_count();

        let replacement = match (def.array_size, index) {
            (_, Some(index)) if index >= len => {
                return Err(ParameterError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                    len,
                });
            }
            (Some(_), Some(index)) => {
                let element = value.coerce_element(def.base_type).ok_or_else(mismatch)?;
                let mut elements = self
                    .values
                    .get(name)
                    .and_then(ParamValue::as_array)
                    .map(<[ParamValue]>::to_vec)
                    .unwrap_or_else(|| vec![def.base_type.zero(); len]);
                elements[index] = element;
                ParamValue::Array(elements)
            }
            (Some(_), None) => {
                let ParamValue::Array(elements) = value else {
                    return Err(mismatch());
                };
                if elements.len() != len {
                    return Err(mismatch());
                }
                let elements = elements
                    .into_iter()
                    .map(|element| element.coerce_element(def.base_type))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(mismatch)?;
                ParamValue::Array(elements)
            }
            (None, _) => value.coerce_element(def.base_type).ok_or_else(mismatch)?,
        };

        self.values.insert(name.to_string(), replacement);
        Ok(())
    }

    /// Adopts `previous` values when it was built from identical definitions.
    pub fn carry_over_from(&mut self, previous: ParameterStore) -> bool {
        if previous.defs == self.defs {
            self.values = previous.values;
            true
        } else {
            false
        }
    }
}

fn expected_shape(def: &ParameterDefinition) -> String {
    match def.array_size {
        Some(len) => format!("{}[{len}]", def.base_type.keyword()),
        None => def.base_type.keyword().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use directives::parse_directives;

    use super::*;

    fn store(source: &str) -> ParameterStore {
        ParameterStore::new(parse_directives(source).params)
    }

    #[test]
    fn starts_from_defaults() {
        let params = store("// @param speed float 2.0\n// @param tint color [1, 0.5, 0]\n");
        assert_eq!(params.value("speed"), Some(&ParamValue::Float(2.0)));
        assert_eq!(
            params.value("tint"),
            Some(&ParamValue::Vec3([1.0, 0.5, 0.0]))
        );
    }

    #[test]
    fn rejects_unknown_names_and_wrong_shapes() {
        let mut params = store("// @param speed float 2.0\n");
        assert_eq!(
            params.set("missing", None, ParamValue::Float(1.0)),
            Err(ParameterError::Unknown {
                name: "missing".into()
            })
        );
        assert!(matches!(
            params.set("speed", None, ParamValue::Vec2([1.0, 2.0])),
            Err(ParameterError::ShapeMismatch { .. })
        ));
        assert_eq!(params.value("speed"), Some(&ParamValue::Float(2.0)));
    }

    #[test]
    fn integers_are_accepted_for_floats() {
        let mut params = store("// @param speed float 2.0\n");
        params.set("speed", None, ParamValue::Int(3)).unwrap();
        assert_eq!(params.value("speed"), Some(&ParamValue::Float(3.0)));
    }

    #[test]
    fn array_elements_are_addressed_by_index() {
        let mut params = store("// @param weights float[3] 0.5\n");
        params.set("weights", Some(1), ParamValue::Float(9.0)).unwrap();
        assert_eq!(
            params.value("weights"),
            Some(&ParamValue::Array(vec![
                ParamValue::Float(0.5),
                ParamValue::Float(9.0),
                ParamValue::Float(0.5),
            ]))
        );
        assert_eq!(
            params.set("weights", Some(3), ParamValue::Float(1.0)),
            Err(ParameterError::IndexOutOfRange {
                name: "weights".into(),
                index: 3,
                len: 3
            })
        );
        assert!(params
            .set("weights", None, ParamValue::Array(vec![ParamValue::Float(1.0)]))
            .is_err());
    }

    #[test]
    fn scalar_accepts_index_zero_only() {
        let mut params = store("// @param count int 4\n");
        params.set("count", Some(0), ParamValue::Int(7)).unwrap();
        assert!(params.set("count", Some(1), ParamValue::Int(7)).is_err());
        assert_eq!(params.value("count"), Some(&ParamValue::Int(7)));
    }

    #[test]
    fn values_carry_over_only_for_identical_definitions() {
        let mut old = store("// @param speed float 2.0\n");
        old.set("speed", None, ParamValue::Float(5.0)).unwrap();

        let mut same = store("// @param speed float 2.0\n");
        assert!(same.carry_over_from(old.clone()));
        assert_eq!(same.value("speed"), Some(&ParamValue::Float(5.0)));

        let mut changed = store("// @param speed float 1.0\n");
        assert!(!changed.carry_over_from(old));
        assert_eq!(changed.value("speed"), Some(&ParamValue::Float(1.0)));
    }
}
