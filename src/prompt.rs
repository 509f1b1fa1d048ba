//! Per-theme prompt composition

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::Theme;

/// Theme that casts the subject as one of the two Mid-Autumn legend
/// characters instead of re-imagining them by gender.
pub const CO_TRANSFORMATION_THEME_ID: &str = "trung-thu-2025-hoa-than-chi-hang-chu-cuoi";

const CO_TRANSFORMATION_MALE: &str = " Transform the person in the photo into the legendary character 'Chú Cuội'. He is the main character of the scene. The beautiful goddess 'Chị Hằng' should also be present in the background or as a secondary character, completing the festive atmosphere.";
const CO_TRANSFORMATION_FEMALE: &str = " Transform the person in the photo into the beautiful goddess 'Chị Hằng'. She is the main character of the scene. The legendary character 'Chú Cuội' should also be present in the background or as a secondary character, completing the festive atmosphere.";
const CO_TRANSFORMATION_JOINT: &str = " In the uploaded photo, transform the male individual into the legendary character 'Chú Cuội' and the female individual into the beautiful goddess 'Chị Hằng'. Both should be depicted as the main characters, interacting joyfully together.";

const REIMAGINE_MALE: &str = " Re-imagine the person as a male character.";
const REIMAGINE_FEMALE: &str = " Re-imagine the person as a female character.";
const CLOTHING_CONSTRAINT: &str = " The character's clothing MUST be appropriate for the specific theme. Do NOT use an 'áo dài' unless the theme explicitly involves cultural events, tradition, or festivals. For example, for sports themes, provide athletic attire; for science themes, provide modern or futuristic clothing.";

/// Declared gender of the photo's subject.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Re-imagine as a male character.
    Male,
    /// Re-imagine as a female character.
    Female,
    /// Declared, but no gender clause is added.
    Unspecified,
    /// Nothing declared yet; generation is refused in this state.
    #[default]
    Undeclared,
}

impl Gender {
    /// True once the user has picked one of the three choices.
    pub fn is_declared(self) -> bool {
        self != Gender::Undeclared
    }
}

impl Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unspecified => "unspecified",
            Gender::Undeclared => "undeclared",
        };
        f.write_str(value)
    }
}

impl FromStr for Gender {
    type Err = String;

    /// Only the three user-selectable values parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "unspecified" => Ok(Gender::Unspecified),
            other => Err(format!("unknown gender: {other}")),
        }
    }
}

/// Builds the final instruction for `theme`: the template followed by the
/// gender-dependent clause(s).
///
/// `gender` should be declared; with [`Gender::Undeclared`] the
/// co-transformation theme gets no character clause and every other theme
/// only gets the clothing constraint.
pub fn compose(theme: &Theme, gender: Gender) -> String {
    let mut prompt = theme.prompt_template.clone();

    if theme.id == CO_TRANSFORMATION_THEME_ID {
        let clause = match gender {
            Gender::Male => CO_TRANSFORMATION_MALE,
            Gender::Female => CO_TRANSFORMATION_FEMALE,
            Gender::Unspecified => CO_TRANSFORMATION_JOINT,
            Gender::Undeclared => "",
        };
        prompt.push_str(clause);
        return prompt;
    }

    match gender {
        Gender::Male => prompt.push_str(REIMAGINE_MALE),
        Gender::Female => prompt.push_str(REIMAGINE_FEMALE),
        Gender::Unspecified | Gender::Undeclared => {}
    }
    prompt.push_str(CLOTHING_CONSTRAINT);
    prompt
}
