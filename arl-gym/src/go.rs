//! Board coordinate conversions for Go.
//!
//! A board coordinate is `(row, col)` counted from the upper left corner. `None` stands for a
//! pass. The other formats:
//!
//! | format | upper left | upper right (19x19) | pass   |
//! |--------|------------|---------------------|--------|
//! | flat   | `0`        | `18`                | `361`  |
//! | SGF    | `"aa"`     | `"sa"`              | `""`   |
//! | GTP    | `"A19"`    | `"T19"`             | `"pass"` |
//!
//! GTP columns skip the letter `I`, and GTP rows are counted from the bottom.

use candle_core::{Error, Result};

pub type Coord = Option<(usize, usize)>;

const SGF_COLUMNS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const GTP_COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Copy)]
pub struct CoordsConvertor {
    board_size: usize,
}

fn column_index(columns: &[u8], c: u8) -> Result<usize> {
    columns
        .iter()
        .position(|col| *col == c)
        .ok_or_else(|| Error::Msg(format!("invalid column {}", c as char)))
}

impl CoordsConvertor {
    pub fn new(board_size: usize) -> Self {
        assert!(
            board_size > 0 && board_size <= GTP_COLUMNS.len(),
            "unsupported board size {board_size}"
        );
        Self { board_size }
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    pub fn pass_move(&self) -> usize {
        self.board_size * self.board_size
    }

    pub fn from_flat(&self, flat: usize) -> Result<Coord> {
        if flat == self.pass_move() {
            return Ok(None);
        }
        if flat > self.pass_move() {
            return Err(Error::Msg(format!("flat coordinate {flat} is off the board")));
        }
        Ok(Some((flat / self.board_size, flat % self.board_size)))
    }

    pub fn to_flat(&self, coord: Coord) -> usize {
        match coord {
            None => self.pass_move(),
            Some((row, col)) => self.board_size * row + col,
        }
    }

    pub fn from_sgf(&self, sgfc: &str) -> Result<Coord> {
        if sgfc.is_empty() || (self.board_size <= 19 && sgfc == "tt") {
            return Ok(None);
        }
        let &[col, row] = sgfc.as_bytes() else {
            return Err(Error::Msg(format!("invalid SGF coordinate {sgfc:?}")));
        };
        Ok(Some((
            column_index(SGF_COLUMNS, row)?,
            column_index(SGF_COLUMNS, col)?,
        )))
    }

    pub fn to_sgf(&self, coord: Coord) -> String {
        match coord {
            None => String::new(),
            Some((row, col)) => {
                [SGF_COLUMNS[col] as char, SGF_COLUMNS[row] as char].iter().collect()
            }
        }
    }

    pub fn from_gtp(&self, gtpc: &str) -> Result<Coord> {
        let gtpc = gtpc.to_uppercase();
        if gtpc == "PASS" {
            return Ok(None);
        }
        let Some((col, row)) = gtpc.as_bytes().split_first() else {
            return Err(Error::Msg("empty GTP coordinate".into()));
        };
        let col = column_index(GTP_COLUMNS, *col)?;
        let row_from_bottom: usize = std::str::from_utf8(row)
            .map_err(Error::wrap)?
            .parse()
            .map_err(Error::wrap)?;
        if row_from_bottom == 0 || row_from_bottom > self.board_size {
            return Err(Error::Msg(format!("GTP row {row_from_bottom} is off the board")));
        }
        Ok(Some((self.board_size - row_from_bottom, col)))
    }

    pub fn to_gtp(&self, coord: Coord) -> String {
        match coord {
            None => "pass".to_owned(),
            Some((row, col)) => format!("{}{}", GTP_COLUMNS[col] as char, self.board_size - row),
        }
    }
}
