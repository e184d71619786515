use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct BoardPins {
    pub button: String,
    pub led: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoardTable {
    pub variants: FxHashMap<String, BoardPins>,
    pub default: BoardPins,
}

impl BoardTable {
    pub fn resolve(&self, device: &str) -> &BoardPins {
        self.variants.get(device).unwrap_or(&self.default)
    }
}

impl Default for BoardTable {
    fn default() -> Self {
        let rpi = BoardPins {
            button: "BCM21".to_string(),
            led: "BCM6".to_string(),
        };

        let mut variants = FxHashMap::default();
        variants.insert("rpi3".to_string(), rpi.clone());
        variants.insert("rpi3bp".to_string(), rpi);

        Self {
            variants,
            default: BoardPins {
                button: "GPIO6_IO14".to_string(),
                led: "GPIO2_IO02".to_string(),
            },
        }
    }
}
