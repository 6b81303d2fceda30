use serde::Serialize;
use url::Url;

/// Informations descriptives d'un périphérique (`friendlyName`,
/// fabricant, modèle...).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeviceDetails {
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<Url>,
    pub model_name: String,
    pub model_description: Option<String>,
    pub model_number: Option<String>,
    pub model_url: Option<Url>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
    pub presentation_url: Option<Url>,
}

impl DeviceDetails {
    pub fn new(friendly_name: &str, manufacturer: &str, model_name: &str) -> Self {
        Self {
            friendly_name: friendly_name.to_string(),
            manufacturer: manufacturer.to_string(),
            model_name: model_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_model_description(mut self, description: &str) -> Self {
        self.model_description = Some(description.to_string());
        self
    }

    pub fn with_model_number(mut self, number: &str) -> Self {
        self.model_number = Some(number.to_string());
        self
    }

    pub fn with_serial_number(mut self, serial: &str) -> Self {
        self.serial_number = Some(serial.to_string());
        self
    }

    pub fn with_manufacturer_url(mut self, url: Url) -> Self {
        self.manufacturer_url = Some(url);
        self
    }

    pub fn with_presentation_url(mut self, url: Url) -> Self {
        self.presentation_url = Some(url);
        self
    }
}
