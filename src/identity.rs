use serde::{Deserialize, Serialize};
use std::fmt;

/// Login of the user behind a request, supplied by the outer authentication
/// layer (e.g. `jane.doe`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActingUser(String);

impl ActingUser {
    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    pub fn login(&self) -> &str {
        &self.0
    }

    /// Human-readable name used in history log messages:
    /// `jane.doe` -> `Jane Doe`
    pub fn display_name(&self) -> String {
        title_case(&self.0.replace('.', " "))
    }
}

impl fmt::Display for ActingUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upper-case every letter that follows a non-letter, lower-case the rest
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_is_letter = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(ch);
            previous_is_letter = false;
        }
    }
    out
}
