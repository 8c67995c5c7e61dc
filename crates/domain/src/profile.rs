use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Partial profile edit. Only the present fields are sent.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.fullname.is_none()
            && self.birth_date.is_none()
            && self.weight.is_none()
            && self.height.is_none()
    }

    /// Later fields win.
    pub fn merge(&mut self, later: ProfileUpdate) {
        if later.fullname.is_some() {
            self.fullname = later.fullname;
        }
        if later.birth_date.is_some() {
            self.birth_date = later.birth_date;
        }
        if later.weight.is_some() {
            self.weight = later.weight;
        }
        if later.height.is_some() {
            self.height = later.height;
        }
    }
}
