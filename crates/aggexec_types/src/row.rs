use crate::scalar::ScalarValue;

/// A single tuple flowing through the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<'a> {
    pub columns: Vec<ScalarValue<'a>>,
}

/// A row with full ownership of all its values.
pub type OwnedRow = Row<'static>;

impl<'a> Row<'a> {
    pub const fn empty() -> Self {
        Row {
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScalarValue<'a>> {
        self.columns.iter()
    }

    /// Project this row down to the given column indices, used to build
    /// grouping-set keys from a wider input tuple.
    pub fn project(&self, indices: &[usize]) -> Row<'a> {
        Row {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    pub fn into_owned(self) -> OwnedRow {
        Row {
            columns: self
                .columns
                .into_iter()
                .map(|scalar| scalar.into_owned())
                .collect(),
        }
    }
}

impl<'a> FromIterator<ScalarValue<'a>> for Row<'a> {
    fn from_iter<T: IntoIterator<Item = ScalarValue<'a>>>(iter: T) -> Self {
        Row {
            columns: iter.into_iter().collect(),
        }
    }
}

impl<'a> std::ops::Index<usize> for Row<'a> {
    type Output = ScalarValue<'a>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.columns[index]
    }
}
