// Vanish Ephemeral Paste Hosting
// Copyright (C) 2021  Edward Shen
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::fmt::{Debug, Display};
use std::str::FromStr;

use rand::prelude::Distribution;
use rand::Rng;
use vanish_common::{ID_ALPHABET, ID_LENGTH};

pub type PasteId = ShortCode<ID_LENGTH>;

/// An unguessable, URL-safe identifier made of `N` characters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShortCode<const N: usize>([ShortCodeChar; N]);

impl<const N: usize> Display for ShortCode<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{}", c.0))
    }
}

impl<const N: usize> Debug for ShortCode<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ShortCode").field(&self.to_string()).finish()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseShortCodeError {
    Length,
    Character(char),
}

impl<const N: usize> FromStr for ShortCode<N> {
    type Err = ParseShortCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().count() != N {
            return Err(ParseShortCodeError::Length);
        }

        // This is fine, it'll get overwritten anyways.
        let mut output = [ShortCodeChar('\0'); N];
        for (slot, c) in output.iter_mut().zip(s.chars()) {
            *slot = c
                .try_into()
                .map_err(|_| ParseShortCodeError::Character(c))?;
        }

        Ok(Self(output))
    }
}

/// `ShortCodeChar` is a single symbol of the URL-safe base64 alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortCodeChar(char);

impl TryFrom<char> for ShortCodeChar {
    type Error = &'static str;

    fn try_from(v: char) -> Result<Self, Self::Error> {
        if v.is_ascii() && ID_ALPHABET.contains(&(v as u8)) {
            Ok(Self(v))
        } else {
            Err("a valid short code character")
        }
    }
}

/// Samples short codes uniformly from the alphabet. Pair it with a
/// cryptographically secure rng; ids are the only thing guarding a paste.
pub struct Generator;

impl Distribution<ShortCodeChar> for Generator {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ShortCodeChar {
        let value = rng.gen_range(0..ID_ALPHABET.len());
        ShortCodeChar(ID_ALPHABET[value] as char)
    }
}

impl<const N: usize> Distribution<ShortCode<N>> for Generator {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ShortCode<N> {
        let mut arr = [ShortCodeChar('\0'); N];

        for c in arr.iter_mut() {
            *c = self.sample(rng);
        }

        ShortCode(arr)
    }
}
