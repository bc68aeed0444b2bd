//! Helper functions for dealing with text data files in svmlight format, i.e.,
//! <target> <feature>:<value> <feature>:<value>...
//! where targets are 0 or 1, features are non-negative u32 indices and values
//! are floats. A bare <feature> is shorthand for <feature>:1.

use std::str;

use bstr::ByteSlice;

use crate::error::{Error, Result};
use crate::sample::{Feature, Observation, Sample};
use crate::scanner::words;

/// Given a line of an svmlight file, this wrapper is a convenient iterator
/// over just the features in that line.
#[derive(Clone)]
pub struct SvmlightLineIter<'a, I> {
    line: usize,
    target: &'a [u8],
    iter: I,
}

/// Splits a line into its target and features. `line` is the 1-based line
/// number reported in errors.
pub fn parse(
    line: usize,
    bytes: &[u8],
) -> Result<SvmlightLineIter<'_, impl Iterator<Item = &[u8]> + Clone + '_>> {
    let mut iter = words(bytes);
    let target = iter
        .next()
        .ok_or_else(|| Error::parse(line, "empty line, expected a label"))?;
    Ok(SvmlightLineIter { line, target, iter })
}

impl<'a, I> Iterator for SvmlightLineIter<'a, I>
where
    I: Iterator<Item = &'a [u8]>,
{
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.line;
        self.iter.next().map(|word| parse_feature(line, word))
    }
}

impl<'a, I> SvmlightLineIter<'a, I> {
    pub fn target(&self) -> Result<u8> {
        parse_label(self.line, self.target)
    }
}

/// Parses a whole observation: a data line plus its (optional) weights line.
/// A missing weight means 1.0.
pub fn parse_observation(line: usize, data: &[u8], weight: Option<&[u8]>) -> Result<Observation> {
    let features = parse(line, data)?;
    let y = features.target()?;
    let x = features.collect::<Result<Vec<_>>>()?;
    let w = match weight {
        Some(bytes) => parse_weight(line, bytes)?,
        None => 1.0,
    };
    Ok(Observation {
        x: Sample::from(x),
        y,
        w,
    })
}

pub fn parse_label(line: usize, word: &[u8]) -> Result<u8> {
    match word {
        b"0" => Ok(0),
        b"1" => Ok(1),
        _ => Err(Error::Label {
            line,
            label: String::from_utf8_lossy(word).into_owned(),
        }),
    }
}

pub fn parse_feature(line: usize, word: &[u8]) -> Result<Feature> {
    let (key, value) = pair_value(word);
    let key = utf8(line, key)?;
    let key: u32 = key
        .parse()
        .map_err(|e| Error::parse(line, format!("feature index {:?}: {}", key, e)))?;
    let value = match value {
        Some(value) => parse_float(line, value)?,
        None => 1.0,
    };
    if !value.is_finite() {
        return Err(Error::parse(
            line,
            format!("feature {} has non-finite value {}", key, value),
        ));
    }
    Ok(Feature { key, value })
}

/// Weights come one per line; surrounding whitespace is ignored.
pub fn parse_weight(line: usize, word: &[u8]) -> Result<f64> {
    let weight = parse_float(line, word.trim())?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(Error::Weight { line, weight });
    }
    Ok(weight)
}

fn pair_value(word: &[u8]) -> (&[u8], Option<&[u8]>) {
    word.rfind_byte(b':')
        .map(|pos| (&word[..pos], Some(&word[pos + 1..])))
        .unwrap_or((word, None))
}

fn parse_float(line: usize, word: &[u8]) -> Result<f64> {
    let word = utf8(line, word)?;
    word.parse()
        .map_err(|e| Error::parse(line, format!("value {:?}: {}", word, e)))
}

fn utf8(line: usize, word: &[u8]) -> Result<&str> {
    str::from_utf8(word).map_err(|_| Error::parse(line, "invalid utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_and_features_in_order() {
        let obs = parse_observation(1, b"1 3:2.5 1:1", None).unwrap();
        assert_eq!(obs.y, 1);
        assert_eq!(obs.w, 1.0);
        assert_eq!(
            obs.x.features(),
            &[Feature::new(3, 2.5), Feature::new(1, 1.0)][..]
        );
    }

    #[test]
    fn bare_feature_means_one() {
        let obs = parse_observation(1, b"0 7", Some(b"0.5")).unwrap();
        assert_eq!(obs.x.features(), &[Feature::new(7, 1.0)][..]);
        assert_eq!(obs.w, 0.5);
    }

    #[test]
    fn label_only_line_has_no_features() {
        let obs = parse_observation(4, b"0", None).unwrap();
        assert!(obs.x.is_empty());
    }

    #[test]
    fn rejects_labels_other_than_zero_or_one() {
        match parse_observation(3, b"2 1:1", None) {
            Err(Error::Label { line: 3, label }) => assert_eq!(label, "2"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_observation(3, b"0.5 1:1", None).is_err());
    }

    #[test]
    fn malformed_numbers_are_parse_errors() {
        for bad in &[&b"1 x:1"[..], b"1 1:abc", b"1 -3:1", b"1 1:"] {
            match parse_observation(9, bad, None) {
                Err(Error::Parse { line: 9, .. }) => {}
                other => panic!("{:?} gave {:?}", bad, other),
            }
        }
    }

    #[test]
    fn non_finite_values_are_parse_errors() {
        for bad in &[&b"1 1:nan"[..], b"1 2:inf", b"0 3:1 4:-inf"] {
            assert!(
                matches!(parse_observation(6, bad, None), Err(Error::Parse { line: 6, .. })),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn empty_line_is_a_parse_error() {
        assert!(matches!(
            parse_observation(2, b"", None),
            Err(Error::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn weights_must_be_non_negative() {
        assert!(matches!(
            parse_observation(5, b"1 1:1", Some(b"-1")),
            Err(Error::Weight { line: 5, .. })
        ));
        assert_eq!(parse_weight(1, b" 2.0 ").unwrap(), 2.0);
        assert!(parse_weight(1, b"nan").is_err());
    }
}
