use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Static configuration handed to a card or panel when it is created. Only the
/// `admin` flag is recognised, any other key is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    pub admin: bool,
}

/// Which of the two front-end surfaces is being driven
#[derive(Debug, Clone, Copy, Derivative, PartialEq, Eq, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// Dashboard card, always shows all five team slots
    #[derivative(Default)]
    Card,
    /// Full-page panel, shows as many teams as the selected team count
    Panel,
}

impl Display for Surface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::Panel => write!(f, "panel"),
        }
    }
}
