use serde::{Deserialize, Serialize};

/// Listing form the host keeps on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingForm {
    pub name: String,
    pub price: Option<f64>,
    pub unit: String,
    pub quantity: Option<f64>,
}

impl Default for ListingForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            price: None,
            unit: "per kg".to_string(),
            quantity: None,
        }
    }
}

/// Fields recognised in a transcription. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

impl ExtractedFields {
    /// Number of recognised fields present
    pub fn present_count(&self) -> usize {
        [
            self.name.is_some(),
            self.price.is_some(),
            self.unit.is_some(),
            self.quantity.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    /// Overwrite the form field-by-field; absent fields keep their current value
    pub fn merge_into(&self, form: &mut ListingForm) {
        if let Some(name) = &self.name {
            form.name = name.clone();
        }
        if let Some(price) = self.price {
            form.price = Some(price);
        }
        if let Some(unit) = &self.unit {
            form.unit = unit.clone();
        }
        if let Some(quantity) = self.quantity {
            form.quantity = Some(quantity);
        }
    }

    /// Empty or whitespace-only strings count as absent
    pub(crate) fn normalized(mut self) -> Self {
        self.name = non_blank(self.name);
        self.unit = non_blank(self.unit);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
