use crate::column::ColumnRef;
use crate::types::Type;
use crate::{Error, Result};

/// Block metadata
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    pub is_overflows: u8,
    pub bucket_num: i32,
}

/// A block is a collection of named columns with the same number of rows
#[derive(Clone)]
pub struct Block {
    columns: Vec<ColumnItem>,
    rows: usize,
    info: BlockInfo,
}

#[derive(Clone)]
struct ColumnItem {
    name: String,
    column: ColumnRef,
}

impl Block {
    /// Create a new empty block
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: 0,
            info: BlockInfo::default(),
        }
    }

    /// Create a block with reserved capacity
    pub fn with_capacity(cols: usize, rows: usize) -> Self {
        Self {
            columns: Vec::with_capacity(cols),
            rows,
            info: BlockInfo::default(),
        }
    }

    /// Append a named column to the block
    pub fn append_column(&mut self, name: impl Into<String>, column: ColumnRef) -> Result<()> {
        let name = name.into();

        if self.columns.is_empty() {
            self.rows = column.size();
        } else if column.size() != self.rows {
            return Err(Error::Validation(format!(
                "All columns in block must have same count of rows. Name: '{}', expected rows: {}, got: {}",
                name,
                self.rows,
                column.size()
            )));
        }

        self.columns.push(ColumnItem { name, column });
        Ok(())
    }

    /// Get the number of columns in the block
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows in the block
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Get column by index
    pub fn column(&self, index: usize) -> Option<ColumnRef> {
        self.columns.get(index).map(|item| item.column.clone())
    }

    /// Get column name by index
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.name.as_str())
    }

    /// Get column by name
    pub fn column_by_name(&self, name: &str) -> Option<ColumnRef> {
        self.columns
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.column.clone())
    }

    /// Get block info
    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    /// Set block info
    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    /// Clear all data from all columns
    pub fn clear(&mut self) {
        for _item in &self.columns {
            // We can't modify through Arc, so this is a limitation
            // In practice, we'd need interior mutability or a different design
            // For now, we'll just reset the block
        }
        self.columns.clear();
        self.rows = 0;
    }

    /// Reserve capacity in all columns
    pub fn reserve(&mut self, _new_cap: usize) {
        for _item in &self.columns {
            // Same limitation as clear() - can't modify through Arc
            // This would need a different design with RefCell or similar
        }
    }

    /// Refresh and validate row count
    pub fn refresh_row_count(&mut self) -> Result<usize> {
        if self.columns.is_empty() {
            self.rows = 0;
            return Ok(0);
        }

        let first_rows = self.columns[0].column.size();

        for item in &self.columns {
            let col_rows = item.column.size();
            if col_rows != first_rows {
                return Err(Error::Validation(format!(
                    "All columns in block must have same count of rows. Name: '{}', expected: {}, got: {}",
                    item.name, first_rows, col_rows
                )));
            }
        }

        self.rows = first_rows;
        Ok(first_rows)
    }

    /// Iterate over columns
    pub fn iter(&self) -> BlockIterator<'_> {
        BlockIterator {
            block: self,
            index: 0,
        }
    }

    /// Check if block is empty
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over block columns
pub struct BlockIterator<'a> {
    block: &'a Block,
    index: usize,
}

impl<'a> Iterator for BlockIterator<'a> {
    type Item = (&'a str, &'a Type, ColumnRef);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.block.columns.len() {
            let item = &self.block.columns[self.index];
            self.index += 1;
            Some((
                &item.name,
                item.column.column_type(),
                item.column.clone(),
            ))
        } else {
            None
        }
    }
}

impl<'a> IntoIterator for &'a Block {
    type Item = (&'a str, &'a Type, ColumnRef);
    type IntoIter = BlockIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// Index access
impl std::ops::Index<usize> for Block {
    type Output = ColumnRef;

    fn index(&self, index: usize) -> &Self::Output {
        if index >= self.columns.len() {
            panic!(
                "Column index out of range: {} >= {}",
                index,
                self.columns.len()
            );
        }
        // We need to return a reference, but we have Arc
        // This is a design limitation - we'll need to restructure
        panic!("Index access not yet supported for Block - use column() method instead");
    }
}
