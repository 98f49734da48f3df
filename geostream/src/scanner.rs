//! Scanner incrémental du tableau `features`
//!
//! Le scanner ne construit aucun arbre JSON : il suit uniquement la profondeur
//! d'imbrication et les chaînes pour délimiter chaque objet du tableau
//! `features`. Les autres membres de la FeatureCollection sont sautés.

use bytes::{Buf, BytesMut};
use memchr::memchr2;

use crate::types::{RawFeature, Scan};
use crate::StreamError;

/// Taille de lecture par défaut (64 Kio)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Avant le `{` racine
    Start,
    /// Dans l'objet racine, hors du tableau `features`
    Root(Member),
    /// Dans le tableau `features`
    Features,
    /// Tableau `features` terminé
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    ExpectKey,
    Key,
    ExpectColon,
    ExpectValue,
    Value,
    AfterValue,
}

/// Scanner alimenté par morceaux successifs d'un document GeoJSON
#[derive(Debug)]
pub struct FeatureScanner {
    buf: BytesMut,
    /// Position de scan dans `buf`
    pos: usize,
    /// Offset absolu de `buf[0]` dans le document
    base: u64,
    phase: Phase,
    in_string: bool,
    escaped: bool,
    nested: u32,
    /// Début du token en cours (nom de membre ou feature)
    token_start: Option<usize>,
    key: Vec<u8>,
    index: u64,
    after_element: bool,
}

impl Default for FeatureScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureScanner {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            pos: 0,
            base: 0,
            phase: Phase::Start,
            in_string: false,
            escaped: false,
            nested: 0,
            token_start: None,
            key: Vec::new(),
            index: 0,
            after_element: false,
        }
    }

    /// Ajoute un morceau du document
    pub fn push(&mut self, chunk: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(chunk);
    }

    /// Buffer prêt à recevoir au moins `additional` octets (lecture directe)
    pub(crate) fn buffer_for_read(&mut self, additional: usize) -> &mut BytesMut {
        self.compact();
        self.buf.reserve(additional);
        &mut self.buf
    }

    /// Nombre de features émises jusqu'ici
    pub fn features_emitted(&self) -> u64 {
        self.index
    }

    /// Offset absolu du prochain octet à scanner
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Vérifie l'état final une fois le flux épuisé
    pub fn finish(&self) -> Result<(), StreamError> {
        match self.phase {
            Phase::Done => Ok(()),
            Phase::Start => Err(StreamError::NotFeatureCollection(
                "empty document".to_string(),
            )),
            _ => Err(StreamError::UnexpectedEof {
                offset: self.base + self.buf.len() as u64,
            }),
        }
    }

    /// Avance le scan jusqu'à la prochaine feature complète ou la fin du buffer
    pub fn scan(&mut self) -> Result<Scan, StreamError> {
        loop {
            if self.phase == Phase::Done {
                return Ok(Scan::Done);
            }

            if self.in_string {
                if !self.skip_string() {
                    return Ok(Scan::NeedData);
                }
                self.close_string();
                continue;
            }

            let Some(&byte) = self.buf.get(self.pos) else {
                return Ok(Scan::NeedData);
            };
            let offset = self.offset();
            self.pos += 1;

            match self.phase {
                Phase::Start => self.step_start(byte, offset)?,
                Phase::Root(member) => self.step_root(member, byte, offset)?,
                Phase::Features => {
                    if let Some(raw) = self.step_features(byte, offset)? {
                        return Ok(Scan::Feature(raw));
                    }
                }
                Phase::Done => {}
            }
        }
    }

    /// Libère les octets déjà consommés en tête de buffer
    fn compact(&mut self) {
        let keep_from = self.token_start.unwrap_or(self.pos);
        if keep_from == 0 {
            return;
        }
        self.buf.advance(keep_from);
        self.base += keep_from as u64;
        self.pos -= keep_from;
        self.token_start = self.token_start.map(|start| start - keep_from);
    }

    /// Saute le contenu d'une chaîne ; `false` si le buffer s'épuise avant la fin
    fn skip_string(&mut self) -> bool {
        if self.escaped {
            if self.pos >= self.buf.len() {
                return false;
            }
            self.pos += 1;
            self.escaped = false;
        }

        loop {
            let Some(found) = memchr2(b'"', b'\\', &self.buf[self.pos..]) else {
                self.pos = self.buf.len();
                return false;
            };
            let at = self.pos + found;
            if self.buf[at] == b'"' {
                self.pos = at + 1;
                self.in_string = false;
                return true;
            }
            if at + 1 >= self.buf.len() {
                self.pos = self.buf.len();
                self.escaped = true;
                return false;
            }
            self.pos = at + 2;
        }
    }

    fn close_string(&mut self) {
        match self.phase {
            Phase::Root(Member::Key) => {
                let start = self.token_start.take().unwrap_or(self.pos - 1);
                self.key.clear();
                self.key.extend_from_slice(&self.buf[start..self.pos - 1]);
                self.phase = Phase::Root(Member::ExpectColon);
            }
            Phase::Root(Member::Value) if self.nested == 0 => {
                self.phase = Phase::Root(Member::AfterValue);
            }
            _ => {}
        }
    }

    fn step_start(&mut self, byte: u8, offset: u64) -> Result<(), StreamError> {
        match byte {
            b if is_whitespace(b) => Ok(()),
            // BOM UTF-8
            0xEF | 0xBB | 0xBF if offset < 3 => Ok(()),
            b'{' => {
                self.phase = Phase::Root(Member::ExpectKey);
                Ok(())
            }
            other => Err(StreamError::NotFeatureCollection(format!(
                "expected '{{' at byte {offset}, found '{}'",
                char::from(other)
            ))),
        }
    }

    fn step_root(&mut self, member: Member, byte: u8, offset: u64) -> Result<(), StreamError> {
        match member {
            Member::ExpectKey => match byte {
                b if is_whitespace(b) => {}
                b'"' => {
                    self.token_start = Some(self.pos);
                    self.in_string = true;
                    self.phase = Phase::Root(Member::Key);
                }
                b'}' => return Err(StreamError::MissingFeatures),
                _ => return Err(StreamError::syntax(offset, "expected member name")),
            },
            // Le nom de membre est consommé par skip_string
            Member::Key => {}
            Member::ExpectColon => match byte {
                b if is_whitespace(b) => {}
                b':' => self.phase = Phase::Root(Member::ExpectValue),
                _ => return Err(StreamError::syntax(offset, "expected ':'")),
            },
            Member::ExpectValue => {
                if is_whitespace(byte) {
                    return Ok(());
                }
                if self.key == b"features" {
                    if byte != b'[' {
                        return Err(StreamError::syntax(offset, "`features` must be an array"));
                    }
                    self.phase = Phase::Features;
                    self.after_element = false;
                    return Ok(());
                }
                self.phase = Phase::Root(Member::Value);
                match byte {
                    b'"' => {
                        self.nested = 0;
                        self.in_string = true;
                    }
                    b'{' | b'[' => self.nested = 1,
                    _ => self.nested = 0,
                }
            }
            Member::Value => match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.nested += 1,
                b'}' if self.nested == 0 => return Err(StreamError::MissingFeatures),
                b'}' | b']' => {
                    if self.nested == 0 {
                        return Err(StreamError::syntax(offset, "unbalanced ']'"));
                    }
                    self.nested -= 1;
                    if self.nested == 0 {
                        self.phase = Phase::Root(Member::AfterValue);
                    }
                }
                b',' if self.nested == 0 => self.phase = Phase::Root(Member::ExpectKey),
                _ => {}
            },
            Member::AfterValue => match byte {
                b if is_whitespace(b) => {}
                b',' => self.phase = Phase::Root(Member::ExpectKey),
                b'}' => return Err(StreamError::MissingFeatures),
                _ => return Err(StreamError::syntax(offset, "expected ',' or '}'")),
            },
        }
        Ok(())
    }

    fn step_features(&mut self, byte: u8, offset: u64) -> Result<Option<RawFeature>, StreamError> {
        let Some(start) = self.token_start else {
            match byte {
                b if is_whitespace(b) => {}
                b',' if self.after_element => self.after_element = false,
                b'{' if !self.after_element => {
                    self.token_start = Some(self.pos - 1);
                    self.nested = 1;
                }
                b']' => self.phase = Phase::Done,
                other => {
                    return Err(StreamError::invalid_feature(
                        self.index,
                        format!(
                            "expected an object at byte {offset}, found '{}'",
                            char::from(other)
                        ),
                    ))
                }
            }
            return Ok(None);
        };

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.nested += 1,
            b'}' | b']' => {
                self.nested -= 1;
                if self.nested == 0 {
                    return Ok(Some(self.emit(start)));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn emit(&mut self, start: usize) -> RawFeature {
        let end = self.pos;
        let mut consumed = self.buf.split_to(end);
        let bytes = consumed.split_off(start).freeze();

        let raw = RawFeature {
            index: self.index,
            offset: self.base + start as u64,
            bytes,
        };

        self.base += end as u64;
        self.pos = 0;
        self.token_start = None;
        self.index += 1;
        self.after_element = true;
        raw
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}
