/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Page-Table / MPU Manager (spec §4.3).
//!
//! Grounded on the teacher's arch-specific page-table sketches
//! (`nucleus/src/arch/*/objects/page*.rs` intent, never completed there) and
//! `nucleus/src/caps/derivation_tree.rs`'s register_bitfields idiom for the
//! region descriptor word; generalized from one hardware's page format into
//! the spec's portable `{size_order, num_order}` node shape so the same
//! logic serves Cortex-M MPU, RISC-V PMP and TriCore class layouts alike.

use crate::{
    config::{MAX_PGT_ENTRIES, MIN_DYNAMIC_REGIONS, REGION_NUM},
    error::PgtError,
};

/// `RME_PGT_SIZE_*`: power-of-two byte size of one entry's mapped region, 2B..1Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeOrder(pub u8);

impl SizeOrder {
    pub const fn bytes(self) -> u128 {
        1u128 << self.0
    }
}

/// `RME_PGT_NUM_*`: `log2` of the entry count in one node, 1..4M entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumOrder(pub u8);

impl NumOrder {
    pub const fn count(self) -> usize {
        1usize << self.0
    }
}

bitflags::bitflags! {
    /// Per-page permission/attribute bits (spec §3 "Page permissions").
    pub struct PageFlags: u32 {
        const READ       = 1 << 0;
        const WRITE      = 1 << 1;
        const EXECUTE    = 1 << 2;
        const CACHEABLE  = 1 << 3;
        const BUFFERABLE = 1 << 4;
        const STATIC     = 1 << 5;
    }
}

/// One page-table entry: either empty, terminal (maps a page), or a pointer
/// to a child directory (arena index into [`PgtArena`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgtEntry {
    Empty,
    Terminal { phys_addr: usize },
    Directory { child: usize },
}

impl PgtEntry {
    pub const fn is_present(self) -> bool {
        !matches!(self, PgtEntry::Empty)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, PgtEntry::Terminal { .. })
    }
}

/// One hardware MPU region mirrored from a representable node (spec §4.3
/// "MPU mirror update").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpuRegion {
    pub base: usize,
    pub size_order: SizeOrder,
    pub attr: PageFlags,
    /// 8-bit subregion-disable mask derived from the node's terminal bits.
    pub subregion_disable: u8,
    pub is_static: bool,
}

/// MPU mirror carried by a top-level node only.
#[derive(Debug, Clone)]
pub struct MpuMirror {
    regions: [Option<MpuRegion>; REGION_NUM],
    /// xorshift state for dynamic-slot eviction.
    lfsr: u32,
}

impl MpuMirror {
    pub const fn new(seed: u32) -> MpuMirror {
        MpuMirror {
            regions: [None; REGION_NUM],
            lfsr: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_rand(&mut self) -> u32 {
        // xorshift32
        let mut x = self.lfsr;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.lfsr = x;
        x
    }

    fn dynamic_count(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| matches!(r, Some(reg) if !reg.is_static))
            .count()
    }

    fn find_matching(&self, base: usize, size_order: SizeOrder) -> Option<usize> {
        self.regions.iter().position(
            |r| matches!(r, Some(reg) if reg.base == base && reg.size_order == size_order),
        )
    }

    /// Install or update `region` in the mirror (spec §4.3 "add_region").
    pub fn add_region(&mut self, region: MpuRegion) -> Result<(), PgtError> {
        if let Some(idx) = self.find_matching(region.base, region.size_order) {
            self.regions[idx] = Some(region);
            return Ok(());
        }
        // Reserve at least MIN_DYNAMIC_REGIONS dynamic slots: refuse to add a
        // new static region whenever that reserve is already exhausted,
        // whether or not a free slot happens to be available right now.
        if region.is_static && self.dynamic_count() < MIN_DYNAMIC_REGIONS {
            return Err(PgtError::Hw);
        }
        if let Some(idx) = self.regions.iter().position(|r| r.is_none()) {
            self.regions[idx] = Some(region);
            return Ok(());
        }
        if region.is_static {
            // No free slot and static regions can't be evicted: refuse.
            return Err(PgtError::Hw);
        }
        // Dynamic mapping, no free slot: evict a random dynamic slot, refusing
        // if that would leave fewer than MIN_DYNAMIC_REGIONS dynamic slots.
        if self.dynamic_count() < MIN_DYNAMIC_REGIONS {
            return Err(PgtError::Hw);
        }
        let dynamic_idxs = self.dynamic_indices();
        let pick = (self.next_rand() as usize) % dynamic_idxs.len;
        self.regions[dynamic_idxs.buf[pick]] = Some(region);
        Ok(())
    }

    fn dynamic_indices(&self) -> DynamicIndices {
        let mut buf = [0usize; REGION_NUM];
        let mut len = 0;
        for (i, r) in self.regions.iter().enumerate() {
            if matches!(r, Some(reg) if !reg.is_static) {
                buf[len] = i;
                len += 1;
            }
        }
        DynamicIndices { buf, len }
    }

    /// Remove the region at `base`/`size_order`, if present.
    pub fn clear_region(&mut self, base: usize, size_order: SizeOrder) {
        if let Some(idx) = self.find_matching(base, size_order) {
            self.regions[idx] = None;
        }
    }

    pub fn regions(&self) -> impl Iterator<Item = &MpuRegion> {
        self.regions.iter().filter_map(|r| r.as_ref())
    }
}

struct DynamicIndices {
    buf: [usize; REGION_NUM],
    len: usize,
}

/// One page-table node (spec §3 "Page-table node").
pub struct PgtNode {
    pub top: bool,
    pub base: usize,
    pub size_order: SizeOrder,
    pub num_order: NumOrder,
    pub child_dir_count: usize,
    pub child_page_count: usize,
    pub uniform_flags: Option<PageFlags>,
    pub asid: Option<u16>,
    entries: [PgtEntry; MAX_PGT_ENTRIES],
    pub mpu: Option<MpuMirror>,
    /// Parent node this was `Pgt_Con`-structed under, if not a root top node.
    pub parent: Option<usize>,
}

impl PgtNode {
    pub fn new_top(base: usize, size_order: SizeOrder, num_order: NumOrder, asid: Option<u16>) -> PgtNode {
        PgtNode {
            top: true,
            base,
            size_order,
            num_order,
            child_dir_count: 0,
            child_page_count: 0,
            uniform_flags: None,
            asid,
            entries: [PgtEntry::Empty; MAX_PGT_ENTRIES],
            mpu: Some(MpuMirror::new(0x9e3779b9)),
            parent: None,
        }
    }

    pub fn new_child(base: usize, size_order: SizeOrder, num_order: NumOrder) -> PgtNode {
        PgtNode {
            top: false,
            base,
            size_order,
            num_order,
            child_dir_count: 0,
            child_page_count: 0,
            uniform_flags: None,
            asid: None,
            entries: [PgtEntry::Empty; MAX_PGT_ENTRIES],
            mpu: None,
            parent: None,
        }
    }

    fn entry_count(&self) -> usize {
        self.num_order.count().min(MAX_PGT_ENTRIES)
    }

    fn region_for(&self, pos: usize) -> MpuRegion {
        let mut mask = 0u8;
        for i in 0..8 {
            let idx = pos * 8 / self.entry_count().max(1) + i;
            if idx < self.entry_count() && !self.entries[idx].is_present() {
                mask |= 1 << i;
            }
        }
        MpuRegion {
            base: self.base,
            size_order: self.size_order,
            attr: self.uniform_flags.unwrap_or(PageFlags::empty()),
            subregion_disable: mask,
            is_static: self.uniform_flags.map(|f| f.contains(PageFlags::STATIC)).unwrap_or(false),
        }
    }
}

/// Arena of live page-table nodes, addressed by integer handle (§9 redesign note).
pub struct PgtArena {
    nodes: [Option<PgtNode>; crate::config::MAX_PAGE_TABLES],
}

impl PgtArena {
    pub fn new() -> PgtArena {
        PgtArena {
            nodes: core::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&PgtNode> {
        self.nodes.get(idx)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut PgtNode> {
        self.nodes.get_mut(idx)?.as_mut()
    }

    pub fn alloc(&mut self, node: PgtNode) -> Result<usize, PgtError> {
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(node);
                return Ok(idx);
            }
        }
        Err(PgtError::Hw)
    }

    pub fn free(&mut self, idx: usize) {
        if let Some(slot) = self.nodes.get_mut(idx) {
            *slot = None;
        }
    }
}

impl Default for PgtArena {
    fn default() -> Self {
        Self::new()
    }
}

/// `Pgt_Crt`: allocate a fresh top-level node.
pub fn pgt_crt(
    arena: &mut PgtArena,
    base: usize,
    size_order: SizeOrder,
    num_order: NumOrder,
    asid: Option<u16>,
) -> Result<usize, PgtError> {
    if base % (1usize.checked_shl(size_order.0 as u32).unwrap_or(usize::MAX)) != 0 {
        return Err(PgtError::Addr);
    }
    arena.alloc(PgtNode::new_top(base, size_order, num_order, asid))
}

/// `Pgt_Del`: free an empty top-level node.
pub fn pgt_del(arena: &mut PgtArena, idx: usize) -> Result<(), PgtError> {
    {
        let node = arena.get(idx).ok_or(PgtError::Addr)?;
        if node.child_dir_count != 0 || node.child_page_count != 0 {
            return Err(PgtError::Map);
        }
    }
    arena.free(idx);
    Ok(())
}

/// Locate the owning top node by walking `parent` links.
fn find_top(arena: &PgtArena, mut idx: usize) -> Result<usize, PgtError> {
    loop {
        let node = arena.get(idx).ok_or(PgtError::Addr)?;
        if node.top {
            return Ok(idx);
        }
        idx = node.parent.ok_or(PgtError::Addr)?;
    }
}

fn mpu_update(arena: &mut PgtArena, node_idx: usize, position: usize, adding: bool) -> Result<(), PgtError> {
    let top_idx = find_top(arena, node_idx)?;
    let region = {
        let node = arena.get(node_idx).ok_or(PgtError::Addr)?;
        node.region_for(position)
    };
    let top = arena.get_mut(top_idx).ok_or(PgtError::Addr)?;
    let mirror = top.mpu.as_mut().ok_or(PgtError::Hw)?;
    if adding {
        mirror.add_region(region)
    } else {
        mirror.clear_region(region.base, region.size_order);
        Ok(())
    }
}

/// `Pgt_Add`: map a page at `position`. Enforces I8 (uniform flags must
/// match across every map into a node once the first is established).
pub fn pgt_add(
    arena: &mut PgtArena,
    node_idx: usize,
    position: usize,
    phys_addr: usize,
    flags: PageFlags,
) -> Result<(), PgtError> {
    {
        let node = arena.get(node_idx).ok_or(PgtError::Addr)?;
        if position >= node.entry_count() {
            return Err(PgtError::Addr);
        }
        if node.entries[position].is_present() {
            return Err(PgtError::Map);
        }
        if let Some(uniform) = node.uniform_flags {
            if uniform != flags {
                return Err(PgtError::Perm);
            }
        }
    }
    {
        let node = arena.get_mut(node_idx).ok_or(PgtError::Addr)?;
        node.entries[position] = PgtEntry::Terminal { phys_addr };
        node.child_page_count += 1;
        if node.uniform_flags.is_none() {
            node.uniform_flags = Some(flags);
        }
    }
    mpu_update(arena, node_idx, position, true)
}

/// `Pgt_Rem`: unmap a page; clears uniform flags once the node is empty again (L2).
pub fn pgt_rem(arena: &mut PgtArena, node_idx: usize, position: usize) -> Result<(), PgtError> {
    {
        let node = arena.get(node_idx).ok_or(PgtError::Addr)?;
        if position >= node.entry_count() || !node.entries[position].is_terminal() {
            return Err(PgtError::Map);
        }
    }
    mpu_update(arena, node_idx, position, false)?;
    let node = arena.get_mut(node_idx).ok_or(PgtError::Addr)?;
    node.entries[position] = PgtEntry::Empty;
    node.child_page_count -= 1;
    if node.child_page_count == 0 {
        node.uniform_flags = None;
    }
    Ok(())
}

/// `Pgt_Con`: construct — attach `child` as a non-top child directory under
/// `parent`'s `position`, pushing any established uniform flags up to the
/// owning top (spec §4.3 "pushed up through the chain").
pub fn pgt_con(arena: &mut PgtArena, parent_idx: usize, position: usize, child_idx: usize) -> Result<(), PgtError> {
    {
        let parent = arena.get(parent_idx).ok_or(PgtError::Addr)?;
        if position >= parent.entry_count() || parent.entries[position].is_present() {
            return Err(PgtError::Map);
        }
    }
    let child_uniform = arena.get(child_idx).ok_or(PgtError::Addr)?.uniform_flags;
    {
        let child = arena.get_mut(child_idx).ok_or(PgtError::Addr)?;
        child.parent = Some(parent_idx);
    }
    {
        let parent = arena.get_mut(parent_idx).ok_or(PgtError::Addr)?;
        parent.entries[position] = PgtEntry::Directory { child: child_idx };
        parent.child_dir_count += 1;
    }
    if let Some(flags) = child_uniform {
        let top_idx = find_top(arena, parent_idx)?;
        let top = arena.get_mut(top_idx).ok_or(PgtError::Addr)?;
        if top.uniform_flags.is_none() {
            top.uniform_flags = Some(flags);
        }
    }
    Ok(())
}

/// `Pgt_Des`: destruct — detach a child directory, failing if it still has
/// mappings.
pub fn pgt_des(arena: &mut PgtArena, parent_idx: usize, position: usize) -> Result<usize, PgtError> {
    let child_idx = {
        let parent = arena.get(parent_idx).ok_or(PgtError::Addr)?;
        match parent.entries.get(position) {
            Some(PgtEntry::Directory { child }) => *child,
            _ => return Err(PgtError::Map),
        }
    };
    {
        let child = arena.get(child_idx).ok_or(PgtError::Addr)?;
        if child.child_dir_count != 0 || child.child_page_count != 0 {
            return Err(PgtError::Map);
        }
    }
    let parent = arena.get_mut(parent_idx).ok_or(PgtError::Addr)?;
    parent.entries[position] = PgtEntry::Empty;
    parent.child_dir_count -= 1;
    Ok(child_idx)
}

/// `Pgt_Lookup`-equivalent read used by the fault handler and by tests (P5).
pub fn pgt_lookup(arena: &PgtArena, node_idx: usize, position: usize) -> Result<PgtEntry, PgtError> {
    let node = arena.get(node_idx).ok_or(PgtError::Addr)?;
    node.entries.get(position).copied().ok_or(PgtError::Addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_top(arena: &mut PgtArena) -> usize {
        pgt_crt(arena, 0x2000_0000, SizeOrder(10), NumOrder(4), None).unwrap()
    }

    #[test]
    fn map_then_unmap_restores_empty_state() {
        let mut arena = PgtArena::new();
        let top = new_top(&mut arena);
        pgt_add(&mut arena, top, 0, 0x1000, PageFlags::READ | PageFlags::WRITE).unwrap();
        assert!(pgt_lookup(&arena, top, 0).unwrap().is_terminal());
        pgt_rem(&mut arena, top, 0).unwrap();
        assert!(!pgt_lookup(&arena, top, 0).unwrap().is_present());
        assert!(arena.get(top).unwrap().uniform_flags.is_none());
    }

    #[test]
    fn second_map_with_different_flags_is_rejected() {
        let mut arena = PgtArena::new();
        let top = new_top(&mut arena);
        pgt_add(&mut arena, top, 0, 0x1000, PageFlags::READ).unwrap();
        assert_eq!(
            pgt_add(&mut arena, top, 1, 0x2000, PageFlags::READ | PageFlags::WRITE),
            Err(PgtError::Perm)
        );
        pgt_add(&mut arena, top, 1, 0x2000, PageFlags::READ).unwrap();
    }

    #[test]
    fn construct_then_destruct_child() {
        let mut arena = PgtArena::new();
        let top = new_top(&mut arena);
        let child_idx = arena
            .alloc(PgtNode::new_child(0x2000_1000, SizeOrder(8), NumOrder(2)))
            .unwrap();
        pgt_con(&mut arena, top, 1, child_idx).unwrap();
        assert_eq!(arena.get(top).unwrap().child_dir_count, 1);
        let freed = pgt_des(&mut arena, top, 1).unwrap();
        assert_eq!(freed, child_idx);
        assert_eq!(arena.get(top).unwrap().child_dir_count, 0);
    }

    #[test]
    fn mpu_mirror_tracks_mapped_region() {
        let mut arena = PgtArena::new();
        let top = new_top(&mut arena);
        pgt_add(&mut arena, top, 0, 0x1000, PageFlags::READ).unwrap();
        assert_eq!(arena.get(top).unwrap().mpu.as_ref().unwrap().regions().count(), 1);
        pgt_rem(&mut arena, top, 0).unwrap();
        assert_eq!(arena.get(top).unwrap().mpu.as_ref().unwrap().regions().count(), 0);
    }

    fn static_region(base: usize) -> MpuRegion {
        MpuRegion { base, size_order: SizeOrder(4), attr: PageFlags::READ, subregion_disable: 0, is_static: true }
    }

    fn dynamic_region(base: usize) -> MpuRegion {
        MpuRegion { base, size_order: SizeOrder(4), attr: PageFlags::READ, subregion_disable: 0, is_static: false }
    }

    #[test]
    fn add_region_refuses_static_via_free_slot_when_reserve_would_be_broken() {
        let mut mpu = MpuMirror::new(1);
        // Entirely empty: a free slot exists, but the dynamic reserve
        // (MIN_DYNAMIC_REGIONS) is not met, so a static must still be
        // refused even though the old code only checked this on the
        // no-free-slot eviction path.
        assert_eq!(mpu.add_region(static_region(0x1000)), Err(PgtError::Hw));

        // Once MIN_DYNAMIC_REGIONS dynamic regions are mapped, the reserve
        // is satisfied and a static can be installed into a free slot.
        mpu.add_region(dynamic_region(0x2000)).unwrap();
        mpu.add_region(dynamic_region(0x3000)).unwrap();
        mpu.add_region(static_region(0x1000)).unwrap();
        assert_eq!(mpu.dynamic_count(), MIN_DYNAMIC_REGIONS);
    }
}
