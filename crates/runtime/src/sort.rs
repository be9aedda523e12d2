//! Sort keys and the stable multi-key sort used by template application, iteration and
//! grouping.

use crate::collation::Collation;
use crate::context::{EvaluationContext, Frame};
use crate::engine::Engine;
use crate::error::{DeclarationSite, EngineError, TypeError};
use crate::seqtype::Occurrence;
use crate::traits::ExprHandle;
use quire_xdm::{AtomicValue, Item};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDataType {
    /// Numbers compare as numbers, everything else as text.
    #[default]
    Auto,
    Text,
    Number,
}

/// Tie-break between strings the collation considers equal but that differ in case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseOrder {
    #[default]
    Default,
    UpperFirst,
    LowerFirst,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub select: ExprHandle,
    pub order: SortOrder,
    pub data_type: SortDataType,
    pub case_order: CaseOrder,
    pub collation: Option<String>,
}

impl SortKey {
    pub fn new(select: ExprHandle) -> Self {
        Self {
            select,
            order: SortOrder::Ascending,
            data_type: SortDataType::Auto,
            case_order: CaseOrder::Default,
            collation: None,
        }
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    pub fn with_data_type(mut self, data_type: SortDataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_case_order(mut self, case_order: CaseOrder) -> Self {
        self.case_order = case_order;
        self
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Empty,
    Number(f64),
    Text(String),
    Other(AtomicValue),
}

impl SortValue {
    fn class(&self) -> u8 {
        match self {
            SortValue::Empty => 0,
            SortValue::Number(_) => 1,
            SortValue::Text(_) => 2,
            SortValue::Other(_) => 3,
        }
    }
}

struct ResolvedKey {
    order: SortOrder,
    case_order: CaseOrder,
    collation: Collation,
}

impl ResolvedKey {
    fn compare(&self, a: &SortValue, b: &SortValue) -> Ordering {
        let ordering = match (a, b) {
            (SortValue::Empty, SortValue::Empty) => Ordering::Equal,
            // NaN sorts before every other number, and equal to itself
            (SortValue::Number(x), SortValue::Number(y)) => match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            },
            (SortValue::Text(x), SortValue::Text(y)) => self.compare_text(x, y),
            (SortValue::Other(x), SortValue::Other(y)) => x
                .compare(y)
                .unwrap_or_else(|| x.to_string_value().cmp(&y.to_string_value())),
            _ => a.class().cmp(&b.class()),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }

    fn compare_text(&self, a: &str, b: &str) -> Ordering {
        let ordering = self.collation.compare(a, b);
        if ordering != Ordering::Equal || self.case_order == CaseOrder::Default {
            return ordering;
        }
        for (x, y) in a.chars().zip(b.chars()) {
            if x == y {
                continue;
            }
            let upper_first = match (x.is_uppercase(), y.is_uppercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => continue,
            };
            return match self.case_order {
                CaseOrder::LowerFirst => upper_first.reverse(),
                _ => upper_first,
            };
        }
        Ordering::Equal
    }
}

impl Engine<'_> {
    /// Sorts `items` by `keys`, evaluating each key with the item as focus. Items with
    /// equal keys keep their input order.
    pub fn sort_items(
        &self,
        items: Vec<Item>,
        keys: &[SortKey],
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<Item>, EngineError> {
        self.sort_by_keys(items, keys, ctx, |item, position, size| {
            Frame::focus(item.clone(), position, size)
        })
    }

    /// Stable sort of arbitrary entries; `frame_for` builds the frame each key is
    /// evaluated in from an entry and its 1-based input position.
    pub(crate) fn sort_by_keys<T>(
        &self,
        entries: Vec<T>,
        keys: &[SortKey],
        ctx: &mut EvaluationContext,
        frame_for: impl Fn(&T, usize, usize) -> Frame,
    ) -> Result<Vec<T>, EngineError> {
        if keys.is_empty() || entries.len() < 2 {
            return Ok(entries);
        }
        let resolved = keys
            .iter()
            .map(|key| {
                let uri = key
                    .collation
                    .as_deref()
                    .unwrap_or(&self.config().default_collation);
                Ok(ResolvedKey {
                    order: key.order,
                    case_order: key.case_order,
                    collation: Collation::from_uri(uri)?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let size = entries.len();
        let mut keyed = Vec::with_capacity(size);
        for (i, entry) in entries.into_iter().enumerate() {
            let values = ctx.scoped(frame_for(&entry, i + 1, size), |ctx| {
                keys.iter()
                    .enumerate()
                    .map(|(index, key)| self.sort_value(key, index, ctx))
                    .collect::<Result<Vec<_>, EngineError>>()
            })?;
            keyed.push((values, entry));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            resolved
                .iter()
                .zip(a.iter().zip(b.iter()))
                .map(|(key, (x, y))| key.compare(x, y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        log::trace!("Sorted {} entries by {} keys", size, keys.len());
        Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
    }

    fn sort_value(
        &self,
        key: &SortKey,
        index: usize,
        ctx: &EvaluationContext,
    ) -> Result<SortValue, EngineError> {
        let atoms = self.evaluate(key.select, ctx)?.atomize(self.forest())?;
        let atom = match atoms.len() {
            0 => return Ok(SortValue::Empty),
            1 => &atoms[0],
            n => {
                return Err(TypeError::Cardinality {
                    site: DeclarationSite::SortKey(index + 1),
                    expected: Occurrence::ZeroOrOne,
                    actual: n,
                }
                .into());
            }
        };
        Ok(match key.data_type {
            SortDataType::Text => SortValue::Text(atom.to_string_value()),
            SortDataType::Number => SortValue::Number(atom.to_double()),
            SortDataType::Auto if atom.is_numeric() => SortValue::Number(atom.to_double()),
            SortDataType::Auto if atom.is_string_like() => SortValue::Text(atom.to_string_value()),
            SortDataType::Auto => SortValue::Other(atom.clone()),
        })
    }
}
