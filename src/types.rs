use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DatasetError;

/// 比率の合計に許容する誤差
const RATIO_TOLERANCE: f64 = 1e-6;

/// データセットの分割先
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// 出力ディレクトリ名
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// train/val/test の分割比率
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    /// 比率を検証して作成
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self, DatasetError> {
        let ratios = Self { train, val, test };
        ratios.validate()?;
        Ok(ratios)
    }

    /// 各比率が [0, 1] に収まり、合計が 1.0 であることを確認
    pub fn validate(&self) -> Result<(), DatasetError> {
        let in_range = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        let sum = self.train + self.val + self.test;
        if !in_range(self.train) || !in_range(self.val) || !in_range(self.test) {
            return Err(DatasetError::InvalidRatios {
                train: self.train,
                val: self.val,
                test: self.test,
            });
        }
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(DatasetError::InvalidRatios {
                train: self.train,
                val: self.val,
                test: self.test,
            });
        }
        Ok(())
    }

    /// 切り捨てで境界を求める。端数はすべて test に回る
    pub fn boundaries(&self, total: usize) -> (usize, usize) {
        let train_end = (total as f64 * self.train).floor() as usize;
        let val_end = train_end + (total as f64 * self.val).floor() as usize;
        (train_end.min(total), val_end.min(total))
    }
}

impl fmt::Display for SplitRatios {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}/{:.2}/{:.2}", self.train, self.val, self.test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ratios_are_valid() {
        assert!(SplitRatios::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_ratios_not_summing_to_one() {
        assert!(SplitRatios::new(0.7, 0.2, 0.2).is_err());
        assert!(SplitRatios::new(-0.1, 0.6, 0.5).is_err());
        assert!(SplitRatios::new(f64::NAN, 0.5, 0.5).is_err());
    }

    #[test]
    fn test_boundaries_favor_test_split() {
        let ratios = SplitRatios::default();
        assert_eq!(ratios.boundaries(100), (70, 85));
        // 10 * 0.15 = 1.5 -> 1 なので test が 2 枚になる
        assert_eq!(ratios.boundaries(10), (7, 8));
        assert_eq!(ratios.boundaries(1), (0, 0));
        assert_eq!(ratios.boundaries(0), (0, 0));
    }

    #[test]
    fn test_split_dir_names() {
        let names: Vec<_> = Split::ALL.iter().map(|s| s.dir_name()).collect();
        assert_eq!(names, vec!["train", "val", "test"]);
        assert_eq!(format!("{}", Split::Val), "val");
    }
}
