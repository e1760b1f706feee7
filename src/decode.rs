use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(
        rename = "latin-1",
        alias = "latin1",
        alias = "iso-8859-1",
        alias = "ISO-8859-1"
    )]
    Latin1,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Latin-1 maps every byte to the code point of the same value and never
    /// returns `None`.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let text = std::str::from_utf8(bytes).ok()?;
                Some(text.strip_prefix(UTF8_BOM).unwrap_or(text).to_string())
            }
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: TextEncoding,
}

pub fn decode_first_match(bytes: &[u8], candidates: &[TextEncoding]) -> Result<Decoded> {
    if candidates.is_empty() {
        bail!("no candidate encodings configured");
    }

    for &encoding in candidates {
        if let Some(text) = encoding.decode(bytes) {
            return Ok(Decoded { text, encoding });
        }
    }

    let tried: Vec<&str> = candidates.iter().map(|e| e.label()).collect();
    bail!("content is not valid in any of: {}", tried.join(", "))
}
