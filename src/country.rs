//! Реестр стран
//!
//! Страны загружаются один раз из плоского текстового файла, по строке на страну:
//!
//! ```text
//! # id, r, g, b, name
//! 1, 0.8, 0.1, 0.1, Aurelia
//! 2, 0.1, 0.3, 0.9, Brennmark
//! ```
//!
//! Компоненты цвета: в диапазоне 0..1. Идентификатор `0` зарезервирован за «ничьей»
//! территорией и добавляется автоматически, если файл его не описывает.
//! После загрузки меняется только `name_point`: кешированный центр владений.

use crate::tile::UNCLAIMED;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Значение `name_point` для страны без клеток
pub const NO_NAME_POINT: (f32, f32) = (-999.0, -999.0);

#[derive(Debug, Error)]
pub enum CountryError {
    #[error("failed to read country list from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("country list line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("duplicate country id {0}")]
    Duplicate(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: u32,
    /// Цвет на карте, три компоненты 0..1
    pub color: [f32; 3],
    pub name: String,
    /// Центр владений в координатах сетки
    pub name_point: (f32, f32),
}

impl Country {
    #[must_use]
    pub fn new(id: u32, color: [f32; 3], name: impl Into<String>) -> Self {
        Self {
            id,
            color,
            name: name.into(),
            name_point: NO_NAME_POINT,
        }
    }

    #[must_use]
    pub fn unclaimed() -> Self {
        Self::new(UNCLAIMED, [0.0, 0.0, 0.0], "Unclaimed")
    }

    #[must_use]
    pub fn has_territory(&self) -> bool {
        self.name_point != NO_NAME_POINT
    }
}

/// Неизменяемый (кроме `name_point`) список стран
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRegistry {
    countries: Vec<Country>,
    by_id: HashMap<u32, usize>,
}

impl CountryRegistry {
    /// Собирает реестр из списка, проверяя уникальность идентификаторов
    pub fn new(countries: Vec<Country>) -> Result<Self, CountryError> {
        let mut list = Vec::with_capacity(countries.len() + 1);
        if !countries.iter().any(|c| c.id == UNCLAIMED) {
            list.push(Country::unclaimed());
        }
        list.extend(countries);
        list.sort_by_key(|c| c.id);

        let mut by_id = HashMap::with_capacity(list.len());
        for (i, country) in list.iter().enumerate() {
            if by_id.insert(country.id, i).is_some() {
                return Err(CountryError::Duplicate(country.id));
            }
        }
        Ok(Self {
            countries: list,
            by_id,
        })
    }

    /// Реестр только с «ничьей» страной
    #[must_use]
    pub fn unclaimed_only() -> Self {
        Self {
            countries: vec![Country::unclaimed()],
            by_id: HashMap::from([(UNCLAIMED, 0)]),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CountryError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| CountryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::parse(&contents)?;
        tracing::info!(path = %path.display(), countries = registry.len(), "country list loaded");
        Ok(registry)
    }

    /// Разбирает текст формата `id, r, g, b, name`
    pub fn parse(contents: &str) -> Result<Self, CountryError> {
        let mut countries = Vec::new();
        for (i, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            countries.push(parse_line(line, i + 1)?);
        }
        Self::new(countries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.countries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Country> {
        self.by_id.get(&id).map(|&i| &self.countries[i])
    }

    /// Поиск по отображаемому имени
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<u32> {
        self.countries.iter().find(|c| c.name == name).map(|c| c.id)
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Country> {
        self.countries.iter()
    }

    /// Палитра цветов, индексированная идентификатором страны.
    ///
    /// Пропуски в нумерации заполняются чёрным.
    #[must_use]
    pub fn palette(&self) -> Vec<[f32; 3]> {
        let max_id = self.countries.last().map_or(0, |c| c.id) as usize;
        let mut palette = vec![[0.0; 3]; max_id + 1];
        for country in &self.countries {
            palette[country.id as usize] = country.color;
        }
        palette
    }

    pub(crate) fn set_name_point(&mut self, id: u32, point: (f32, f32)) {
        if let Some(&i) = self.by_id.get(&id) {
            self.countries[i].name_point = point;
        }
    }
}

fn parse_line(line: &str, number: usize) -> Result<Country, CountryError> {
    let malformed = |reason: String| CountryError::Malformed {
        line: number,
        reason,
    };

    let fields: Vec<&str> = line.splitn(5, ',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(malformed(format!(
            "expected 5 fields, found {}",
            fields.len()
        )));
    }

    let id = fields[0]
        .parse::<u32>()
        .map_err(|e| malformed(format!("bad id {:?}: {e}", fields[0])))?;

    let mut color = [0.0; 3];
    for (slot, raw) in color.iter_mut().zip(&fields[1..4]) {
        let value = raw
            .parse::<f32>()
            .map_err(|e| malformed(format!("bad color component {raw:?}: {e}")))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(malformed(format!("color component {value} outside [0, 1]")));
        }
        *slot = value;
    }

    let name = fields[4];
    if name.is_empty() {
        return Err(malformed("empty name".to_string()));
    }
    Ok(Country::new(id, color, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "\
# id, r, g, b, name
1, 1.0, 0.0, 0.0, Aurelia

3, 0.0, 0.0, 1.0, Kingdom of Brennmark, North
";

    #[test]
    fn parses_list_and_reserves_unclaimed() {
        let registry = CountryRegistry::parse(LIST).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(0).unwrap().name, "Unclaimed");
        assert_eq!(registry.get(1).unwrap().color, [1.0, 0.0, 0.0]);
        // имя может содержать запятые
        assert_eq!(registry.get(3).unwrap().name, "Kingdom of Brennmark, North");
        assert_eq!(registry.id_by_name("Aurelia"), Some(1));
        assert!(!registry.contains(2));
        assert!(!registry.get(1).unwrap().has_territory());
    }

    #[test]
    fn palette_is_indexed_by_id() {
        let registry = CountryRegistry::parse(LIST).unwrap();
        let palette = registry.palette();
        assert_eq!(palette.len(), 4);
        assert_eq!(palette[1], [1.0, 0.0, 0.0]);
        assert_eq!(palette[2], [0.0, 0.0, 0.0]);
        assert_eq!(palette[3], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn rejects_duplicates_and_bad_lines() {
        assert!(matches!(
            CountryRegistry::parse("1, 0, 0, 0, A\n1, 1, 1, 1, B"),
            Err(CountryError::Duplicate(1))
        ));
        assert!(matches!(
            CountryRegistry::parse("1, 0, 0, A"),
            Err(CountryError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            CountryRegistry::parse("\n2, 0, 2.0, 0, A"),
            Err(CountryError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn explicit_zero_entry_replaces_default() {
        let registry = CountryRegistry::parse("0, 0.2, 0.2, 0.2, Wilderness").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0).unwrap().name, "Wilderness");
    }
}
