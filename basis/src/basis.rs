//! Basis set container and derived shell-to-AO maps.

use crate::shell::Shell;

#[derive(Debug, Clone, Default)]
pub struct BasisSet {
    shells: Vec<Shell>,
}

impl BasisSet {
    pub fn new(shells: Vec<Shell>) -> Self {
        BasisSet { shells }
    }

    pub fn nshells(&self) -> usize {
        self.shells.len()
    }

    pub fn nbf(&self) -> usize {
        self.shells.iter().map(|s| s.size()).sum()
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    pub fn shell(&self, i: usize) -> &Shell {
        &self.shells[i]
    }

    /// AO count of a shell subset. The iterator need not be sorted.
    pub fn nbf_subset<I: IntoIterator<Item = usize>>(&self, shell_idx: I) -> usize {
        shell_idx.into_iter().map(|i| self.shells[i].size()).sum()
    }

    pub fn max_l(&self) -> i32 {
        self.shells.iter().map(|s| s.l).max().unwrap_or(0)
    }
}

/// Compressed shell-to-AO bookkeeping derived from a [`BasisSet`].
#[derive(Debug, Clone)]
pub struct BasisSetMap {
    shell_to_first_ao: Vec<usize>,
    shell_size: Vec<usize>,
    shell_pure: Vec<bool>,
    max_l: i32,
}

impl BasisSetMap {
    pub fn new(basis: &BasisSet) -> Self {
        let mut shell_to_first_ao = Vec::with_capacity(basis.nshells());
        let mut shell_size = Vec::with_capacity(basis.nshells());
        let mut shell_pure = Vec::with_capacity(basis.nshells());
        let mut off = 0;
        for sh in basis.shells() {
            shell_to_first_ao.push(off);
            shell_size.push(sh.size());
            shell_pure.push(sh.pure);
            off += sh.size();
        }
        BasisSetMap {
            shell_to_first_ao,
            shell_size,
            shell_pure,
            max_l: basis.max_l(),
        }
    }

    #[inline]
    pub fn shell_to_first_ao(&self, ish: usize) -> usize {
        self.shell_to_first_ao[ish]
    }

    #[inline]
    pub fn shell_size(&self, ish: usize) -> usize {
        self.shell_size[ish]
    }

    #[inline]
    pub fn shell_pure(&self, ish: usize) -> bool {
        self.shell_pure[ish]
    }

    #[inline]
    pub fn max_l(&self) -> i32 {
        self.max_l
    }

    pub fn nshells(&self) -> usize {
        self.shell_size.len()
    }

    pub fn any_pure(&self) -> bool {
        self.shell_pure.iter().any(|&p| p)
    }
}
