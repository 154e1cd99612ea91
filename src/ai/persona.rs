//! Chat personas.

use std::fmt;

/// Tone of the assistant, selected per user with `/persona`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Persona {
    #[default]
    Default,
    Robot,
    Listener,
    Nerd,
    Cynic,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::Default,
        Persona::Robot,
        Persona::Listener,
        Persona::Nerd,
        Persona::Cynic,
    ];

    /// Stored key.
    pub fn key(&self) -> &'static str {
        match self {
            Persona::Default => "default",
            Persona::Robot => "robot",
            Persona::Listener => "listener",
            Persona::Nerd => "nerd",
            Persona::Cynic => "cynic",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    /// Unknown stored keys fall back to the default persona.
    pub fn from_key_lossy(key: &str) -> Self {
        Self::parse(key).unwrap_or_default()
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Persona::Default => {
                "Ты дружелюбный и полезный AI-помощник. Отвечай кратко и по делу на русском языке."
            }
            Persona::Robot => {
                "Ты технический AI-робот. Отвечай точно, формально и структурированно. Избегай эмоций."
            }
            Persona::Listener => {
                "Ты эмпатичный слушатель и психолог. Проявляй понимание, поддержку и давай мудрые советы."
            }
            Persona::Nerd => {
                "Ты эрудированный ученый. Давай детальные, научно обоснованные ответы с фактами и объяснениями."
            }
            Persona::Cynic => {
                "Ты критически мыслящий циник. Отвечай с долей скептицизма и сарказма, но оставайся полезным."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        for persona in Persona::ALL {
            assert_eq!(Persona::parse(persona.key()), Some(persona));
        }
        assert_eq!(Persona::parse(" NERD "), Some(Persona::Nerd));
        assert_eq!(Persona::parse("pirate"), None);
        assert_eq!(Persona::from_key_lossy("pirate"), Persona::Default);
    }
}
