//! Three-way classification of one rank's slice against the pivot.

use std::fmt;
use std::str::FromStr;

use crate::error::SplitError;

/// Output category of an element, relative to the pivot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Smaller,
    Equal,
    Larger,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Smaller, Category::Equal, Category::Larger];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Label used when printing the consolidated result.
    pub const fn label(self) -> &'static str {
        match self {
            Category::Smaller => "L:",
            Category::Equal => "E:",
            Category::Larger => "G:",
        }
    }

    #[inline]
    pub fn of(value: u8, pivot: u8) -> Self {
        match value.cmp(&pivot) {
            std::cmp::Ordering::Less => Category::Smaller,
            std::cmp::Ordering::Equal => Category::Equal,
            std::cmp::Ordering::Greater => Category::Larger,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Smaller => write!(f, "smaller"),
            Category::Equal => write!(f, "equal"),
            Category::Larger => write!(f, "larger"),
        }
    }
}

/// One rank's slice split into three sequences. Each sequence keeps the scan order of the slice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalPartition {
    pub smaller: Vec<u8>,
    pub equal: Vec<u8>,
    pub larger: Vec<u8>,
}

impl LocalPartition {
    pub fn get(&self, category: Category) -> &[u8] {
        match category {
            Category::Smaller => &self.smaller,
            Category::Equal => &self.equal,
            Category::Larger => &self.larger,
        }
    }

    pub fn len(&self) -> usize {
        self.smaller.len() + self.equal.len() + self.larger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Classify {
    fn name() -> String;

    fn classify(v: &[u8], pivot: u8) -> LocalPartition;
}

macro_rules! classify_impl {
    ($name:expr) => {
        pub struct ClassifyImpl;

        impl crate::classify::Classify for ClassifyImpl {
            fn name() -> String {
                $name.into()
            }

            #[inline]
            fn classify(v: &[u8], pivot: u8) -> crate::classify::LocalPartition {
                classify(v, pivot)
            }
        }
    };
}

pub mod scan_branchless;
pub mod scan_branchy;

/// Runtime selection of a [`Classify`] implementation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ClassifierKind {
    #[default]
    Branchy,
    Branchless,
}

impl ClassifierKind {
    pub fn name(self) -> String {
        match self {
            ClassifierKind::Branchy => <scan_branchy::ClassifyImpl as Classify>::name(),
            ClassifierKind::Branchless => <scan_branchless::ClassifyImpl as Classify>::name(),
        }
    }

    pub fn classify(self, v: &[u8], pivot: u8) -> LocalPartition {
        match self {
            ClassifierKind::Branchy => scan_branchy::ClassifyImpl::classify(v, pivot),
            ClassifierKind::Branchless => scan_branchless::ClassifyImpl::classify(v, pivot),
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branchy" | "scan_branchy" => Ok(Self::Branchy),
            "branchless" | "scan_branchless" => Ok(Self::Branchless),
            _ => Err(SplitError::Config(format!("unknown classifier '{s}'"))),
        }
    }
}
