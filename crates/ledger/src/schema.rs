use std::collections::BTreeMap;

use crate::abi::{self, AbiError, AbiType, AbiValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub ty: AbiType,
}

/// Parsed attestation schema encoding string, e.g.
/// `string subject, string controller, string method, uint256 observedAt`.
///
/// Attestation data is the ABI encoding of the fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEncoding {
    fields: Vec<SchemaField>,
}

impl SchemaEncoding {
    pub fn parse(encoding: &str) -> Result<Self, AbiError> {
        let encoding = encoding.trim();
        if encoding.is_empty() {
            return Err(AbiError::new("schema encoding string is empty"));
        }

        let mut fields: Vec<SchemaField> = Vec::new();
        for raw_field in encoding.split(',') {
            let mut parts = raw_field.split_whitespace();
            let (Some(ty), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(AbiError::new(format!(
                    "schema field must be `<type> <name>`, got `{}`",
                    raw_field.trim()
                )));
            };

            if fields.iter().any(|field| field.name == name) {
                return Err(AbiError::new(format!("duplicate schema field {}", name)));
            }

            fields.push(SchemaField {
                name: name.to_string(),
                ty: AbiType::parse(ty)?,
            });
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }

    fn types(&self) -> Vec<AbiType> {
        self.fields.iter().map(|field| field.ty.clone()).collect()
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<(String, AbiValue)>, AbiError> {
        let values = abi::decode(&self.types(), data)?;
        Ok(self
            .fields
            .iter()
            .map(|field| field.name.clone())
            .zip(values)
            .collect())
    }

    /// Decodes `data` into field name → display string.
    pub fn decode_to_strings(&self, data: &[u8]) -> Result<BTreeMap<String, String>, AbiError> {
        Ok(self
            .decode(data)?
            .into_iter()
            .map(|(name, value)| (name, value.to_display_string()))
            .collect())
    }

    /// Encodes one textual value per declared field. Every field must be
    /// supplied and no unknown field is accepted.
    pub fn encode_strings(&self, values: &BTreeMap<String, String>) -> Result<Vec<u8>, AbiError> {
        if let Some(unknown) = values.keys().find(|name| !self.has_field(name)) {
            return Err(AbiError::new(format!(
                "value supplied for undeclared field {}",
                unknown
            )));
        }

        let encoded = self
            .fields
            .iter()
            .map(|field| {
                let text = values
                    .get(&field.name)
                    .ok_or_else(|| AbiError::new(format!("missing value for field {}", field.name)))?;
                AbiValue::from_text(&field.ty, text)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(abi::encode(&encoded))
    }
}
