//! Per-process virtual memory.
//!
//! An address space is a sorted, non-overlapping set of VM areas, each
//! mapping a page range onto a memory object at some page offset. The
//! map owns the page table it programs; every change to the area set
//! invalidates the affected translations and flushes them from the TLB.
//!
//! Private mappings wrap their object in a shadow at `mmap` time and get
//! fresh sibling shadows on fork, which is the whole of the
//! copy-on-write protocol: writes materialize pages in the writer's
//! shadow while every other mapping keeps reading the base.

use core::any::Any;
use core::cmp;
use core::ops::Range;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::errno::{Errno, KResult};
use crate::fs::ArcVnode;
use crate::mobj::MemObj;
use crate::page::Page;
use crate::param::{PAGE_SIZE, USER_HIGH_PAGE, USER_LOW_PAGE};
use crate::pframe::PFrameGuard;

bitflags! {
    pub struct Prot: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXEC = 0x4;
    }
}

bitflags! {
    pub struct MapFlags: u32 {
        const SHARED = 0x1;
        const PRIVATE = 0x2;
        const FIXED = 0x4;
        const ANON = 0x8;
    }
}

/// Search direction for a free range.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum FindDir {
    LoHi,
    HiLo,
}

/// The page-table half of the MMU, consumed as a collaborator.
pub trait PageTable: Send {
    /// Installs a translation for `vfn` onto the frame's page.
    fn map_page(&mut self, vfn: usize, frame: &PFrameGuard, prot: Prot);

    /// Drops every translation in the range.
    fn unmap_range(&mut self, range: Range<usize>);

    /// TLB shootdown for the range.
    fn flush_range(&mut self, range: Range<usize>);

    fn as_any(&self) -> &dyn Any;
}

/// Software page table backing the host target: virtual frame number to
/// page address and permissions.
pub struct FlatPageTable {
    entries: BTreeMap<usize, (usize, Prot)>,
}

impl FlatPageTable {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            entries: BTreeMap::new(),
        })
    }

    /// The installed translation, if any. Test hook.
    pub fn translation(&self, vfn: usize) -> Option<(usize, Prot)> {
        self.entries.get(&vfn).copied()
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.len()
    }
}

impl PageTable for FlatPageTable {
    fn map_page(&mut self, vfn: usize, frame: &PFrameGuard, prot: Prot) {
        let addr = frame.data() as *const Page as usize;
        let _ = self.entries.insert(vfn, (addr, prot));
    }

    fn unmap_range(&mut self, range: Range<usize>) {
        let stale: Vec<usize> = self.entries.range(range).map(|(k, _)| *k).collect();
        for vfn in stale {
            let _ = self.entries.remove(&vfn);
        }
    }

    fn flush_range(&mut self, _range: Range<usize>) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One contiguous mapping.
pub struct VmArea {
    /// Virtual frame range, half open.
    pub start: usize,
    pub end: usize,
    /// Page offset into `obj` corresponding to `start`.
    pub off: u64,
    pub prot: Prot,
    pub shared: bool,
    pub obj: Arc<MemObj>,
    /// Keeps a mapped file's vnode, and with it the object's pager,
    /// alive for the mapping's lifetime.
    pub file: Option<ArcVnode>,
}

impl VmArea {
    pub fn pages(&self) -> usize {
        self.end - self.start
    }

    fn contains(&self, vfn: usize) -> bool {
        self.start <= vfn && vfn < self.end
    }

    /// Object page index backing `vfn`.
    fn obj_page(&self, vfn: usize) -> u64 {
        debug_assert!(self.contains(vfn));
        self.off + (vfn - self.start) as u64
    }
}

/// A process's address space: its areas plus the page table they
/// program.
pub struct VmMap {
    areas: BTreeMap<usize, VmArea>,
    pt: Box<dyn PageTable>,
}

impl VmMap {
    pub fn new(pt: Box<dyn PageTable>) -> Self {
        Self {
            areas: BTreeMap::new(),
            pt,
        }
    }

    pub fn page_table(&self) -> &dyn PageTable {
        &*self.pt
    }

    /// Test hook for the concrete host page table.
    #[cfg(test)]
    pub(crate) fn flat_pt(&self) -> &FlatPageTable {
        self.pt
            .as_any()
            .downcast_ref::<FlatPageTable>()
            .expect("host page table")
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// The area containing `vfn`, if any.
    pub fn lookup(&self, vfn: usize) -> Option<&VmArea> {
        let (_, area) = self.areas.range(..=vfn).next_back()?;
        if area.end > vfn {
            Some(area)
        } else {
            None
        }
    }

    /// No area intersects `[lopage, lopage + npages)`.
    pub fn is_range_empty(&self, lopage: usize, npages: usize) -> bool {
        let hi = lopage + npages;
        match self.areas.range(..hi).next_back() {
            Some((_, area)) => area.end <= lopage,
            None => true,
        }
    }

    /// Finds `npages` of unmapped space inside the user range, scanning
    /// up from the bottom or down from the top.
    pub fn find_range(&self, npages: usize, dir: FindDir) -> Option<usize> {
        match dir {
            FindDir::LoHi => {
                let mut cursor = USER_LOW_PAGE;
                for area in self.areas.values() {
                    if area.start >= cursor && area.start - cursor >= npages {
                        break;
                    }
                    cursor = cmp::max(cursor, area.end);
                }
                if cursor + npages <= USER_HIGH_PAGE {
                    Some(cursor)
                } else {
                    None
                }
            }
            FindDir::HiLo => {
                let mut cursor = USER_HIGH_PAGE;
                for area in self.areas.values().rev() {
                    if area.end <= cursor && cursor - area.end >= npages {
                        break;
                    }
                    cursor = cmp::min(cursor, area.start);
                }
                if cursor >= USER_LOW_PAGE + npages {
                    Some(cursor - npages)
                } else {
                    None
                }
            }
        }
    }

    /// Installs an area whose range the caller has already cleared.
    pub fn insert(&mut self, area: VmArea) {
        debug_assert!(area.start < area.end, "vmmap: empty area");
        debug_assert!(
            self.is_range_empty(area.start, area.pages()),
            "vmmap: overlapping insert"
        );
        let _ = self.areas.insert(area.start, area);
        self.assert_valid();
    }

    /// The mmap entry point under the syscall layer.
    ///
    /// Picks the object (anonymous or the file's), picks the range
    /// (`lopage == 0` means search in direction `dir`; `MAP_FIXED`
    /// evicts whatever overlaps; otherwise the range must be empty),
    /// wraps private mappings in a fresh shadow, and installs the area.
    pub fn map(
        &mut self,
        file: Option<ArcVnode>,
        lopage: usize,
        npages: usize,
        prot: Prot,
        flags: MapFlags,
        off: u64,
        dir: FindDir,
    ) -> KResult<usize> {
        if npages == 0 {
            return Err(Errno::EINVAL);
        }
        let shared = match (
            flags.contains(MapFlags::SHARED),
            flags.contains(MapFlags::PRIVATE),
        ) {
            (true, false) => true,
            (false, true) => false,
            _ => return Err(Errno::EINVAL),
        };

        let obj = if flags.contains(MapFlags::ANON) {
            MemObj::new_anon()
        } else {
            file.as_ref().ok_or(Errno::EINVAL)?.mmap_obj()?
        };

        let start = if lopage == 0 {
            if flags.contains(MapFlags::FIXED) {
                return Err(Errno::EINVAL);
            }
            self.find_range(npages, dir).ok_or(Errno::ENOMEM)?
        } else {
            if lopage < USER_LOW_PAGE || lopage + npages > USER_HIGH_PAGE {
                return Err(Errno::EINVAL);
            }
            if flags.contains(MapFlags::FIXED) {
                self.remove(lopage, npages)?;
            } else if !self.is_range_empty(lopage, npages) {
                return Err(Errno::EINVAL);
            }
            lopage
        };

        let obj = if shared { obj } else { MemObj::new_shadow(obj) };
        let file = if flags.contains(MapFlags::ANON) { None } else { file };
        self.insert(VmArea {
            start,
            end: start + npages,
            off,
            prot,
            shared,
            obj,
            file,
        });
        Ok(start)
    }

    /// Unmaps `[lopage, lopage + npages)`. Each overlapping area is
    /// split, truncated on either side, or deleted; the page table and
    /// TLB are purged after every change.
    pub fn remove(&mut self, lopage: usize, npages: usize) -> KResult<()> {
        if npages == 0 {
            return Err(Errno::EINVAL);
        }
        let hi = lopage + npages;
        let affected: Vec<usize> = self
            .areas
            .range(..hi)
            .filter(|(_, area)| area.end > lopage)
            .map(|(start, _)| *start)
            .collect();
        for key in affected {
            let mut area = self.areas.remove(&key).expect("vmmap: area vanished");
            let ov_lo = cmp::max(area.start, lopage);
            let ov_hi = cmp::min(area.end, hi);
            debug_assert!(ov_lo < ov_hi);

            if area.start < ov_lo && ov_hi < area.end {
                // Interior: keep the head, split off a tail over the same
                // object.
                let tail = VmArea {
                    start: ov_hi,
                    end: area.end,
                    off: area.off + (ov_hi - area.start) as u64,
                    prot: area.prot,
                    shared: area.shared,
                    obj: area.obj.clone(),
                    file: area.file.clone(),
                };
                area.end = ov_lo;
                let _ = self.areas.insert(area.start, area);
                let _ = self.areas.insert(tail.start, tail);
            } else if area.start < ov_lo {
                area.end = ov_lo;
                let _ = self.areas.insert(area.start, area);
            } else if ov_hi < area.end {
                area.off += (ov_hi - area.start) as u64;
                area.start = ov_hi;
                let _ = self.areas.insert(area.start, area);
            }
            // else: fully covered, the area just goes away.

            self.pt.unmap_range(ov_lo..ov_hi);
            self.pt.flush_range(ov_lo..ov_hi);
        }
        self.assert_valid();
        Ok(())
    }

    /// Builds the child address space of a fork over `pt`.
    ///
    /// Shared areas alias the same object. Each private area gets two
    /// fresh shadows over its current object, one staying with this map
    /// and one going to the child; the parent's translations drop so its
    /// next write faults through its new shadow.
    pub fn clone_into(&mut self, pt: Box<dyn PageTable>) -> VmMap {
        let mut child = VmMap::new(pt);
        let keys: Vec<usize> = self.areas.keys().copied().collect();
        for key in keys {
            let area = self.areas.get_mut(&key).expect("vmmap: area vanished");
            let child_obj = if area.shared {
                area.obj.clone()
            } else {
                let parent_shadow = MemObj::new_shadow(area.obj.clone());
                let child_shadow = MemObj::new_shadow(area.obj.clone());
                // The old object's reference moves into the two shadows.
                area.obj = parent_shadow;
                child_shadow
            };
            let _ = child.areas.insert(
                key,
                VmArea {
                    start: area.start,
                    end: area.end,
                    off: area.off,
                    prot: area.prot,
                    shared: area.shared,
                    obj: child_obj,
                    file: area.file.clone(),
                },
            );
            if !area.shared {
                let (start, end) = (area.start, area.end);
                self.pt.unmap_range(start..end);
                self.pt.flush_range(start..end);
            }
        }
        log::debug!("vmmap: cloned {} areas", child.areas.len());
        child.assert_valid();
        child
    }

    /// Cross-address-space read: copies out of whatever the mapped
    /// objects currently hold. Unmapped addresses fail with `EINVAL`.
    pub fn read_bytes(&self, vaddr: usize, buf: &mut [u8]) -> KResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let addr = vaddr + done;
            let vfn = addr / PAGE_SIZE;
            let area = self.lookup(vfn).ok_or(Errno::EINVAL)?;
            let begin = addr % PAGE_SIZE;
            let m = cmp::min(buf.len() - done, PAGE_SIZE - begin);
            let guard = area.obj.get_pframe(area.obj_page(vfn), false)?;
            buf[done..done + m].copy_from_slice(&guard.data()[begin..begin + m]);
            done += m;
        }
        Ok(())
    }

    /// Cross-address-space write; dirties the touched frames.
    pub fn write_bytes(&mut self, vaddr: usize, buf: &[u8]) -> KResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let addr = vaddr + done;
            let vfn = addr / PAGE_SIZE;
            let area = self.lookup(vfn).ok_or(Errno::EINVAL)?;
            let begin = addr % PAGE_SIZE;
            let m = cmp::min(buf.len() - done, PAGE_SIZE - begin);
            let mut guard = area.obj.get_pframe(area.obj_page(vfn), true)?;
            guard.data_mut()[begin..begin + m].copy_from_slice(&buf[done..done + m]);
            done += m;
        }
        Ok(())
    }

    /// Fault entry point. Checks the permissions the access needs,
    /// fetches the frame (materializing a private copy on a write to a
    /// private mapping), and programs the page table. A read fault on a
    /// private mapping installs the page without write permission so the
    /// first write still faults.
    pub fn handle_pagefault(&mut self, vaddr: usize, write: bool) -> KResult<()> {
        let vfn = vaddr / PAGE_SIZE;
        let (obj, pageno, prot, shared) = {
            let area = self.lookup(vfn).ok_or(Errno::EINVAL)?;
            if !area.prot.contains(Prot::READ) {
                return Err(Errno::EACCES);
            }
            if write && !area.prot.contains(Prot::WRITE) {
                return Err(Errno::EACCES);
            }
            (area.obj.clone(), area.obj_page(vfn), area.prot, area.shared)
        };
        let guard = obj.get_pframe(pageno, write)?;
        let effective = if write || shared {
            prot
        } else {
            prot & !Prot::WRITE
        };
        self.pt.map_page(vfn, &guard, effective);
        Ok(())
    }

    /// Collapses each private area's shadow chain where possible. The
    /// fork path calls this on both sides once siblings start dropping.
    pub fn collapse_shadows(&self) {
        for area in self.areas.values() {
            if !area.shared {
                area.obj.shadow_collapse();
            }
        }
    }

    fn assert_valid(&self) {
        if cfg!(debug_assertions) {
            let mut prev_end = 0;
            for (start, area) in &self.areas {
                assert_eq!(*start, area.start);
                assert!(area.start < area.end, "vmmap: empty area");
                assert!(prev_end <= area.start, "vmmap: overlap");
                prev_end = area.end;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anon_map(map: &mut VmMap, lopage: usize, npages: usize) -> usize {
        map.map(
            None,
            lopage,
            npages,
            Prot::READ | Prot::WRITE,
            MapFlags::ANON | MapFlags::PRIVATE,
            0,
            FindDir::HiLo,
        )
        .unwrap()
    }

    fn new_map() -> VmMap {
        VmMap::new(FlatPageTable::new())
    }

    #[test]
    fn lookup_and_bounds() {
        let mut map = new_map();
        let start = anon_map(&mut map, USER_LOW_PAGE + 10, 4);
        assert_eq!(start, USER_LOW_PAGE + 10);
        assert!(map.lookup(start - 1).is_none());
        assert!(map.lookup(start).is_some());
        assert!(map.lookup(start + 3).is_some());
        assert!(map.lookup(start + 4).is_none());
        assert!(!map.is_range_empty(start + 3, 2));
        assert!(map.is_range_empty(start + 4, 2));
    }

    #[test]
    fn find_range_both_directions() {
        let mut map = new_map();
        let top = map.find_range(3, FindDir::HiLo).unwrap();
        assert_eq!(top, USER_HIGH_PAGE - 3);
        let bottom = map.find_range(3, FindDir::LoHi).unwrap();
        assert_eq!(bottom, USER_LOW_PAGE);

        // Carve the space up and search between areas.
        let _ = anon_map(&mut map, USER_LOW_PAGE, 2);
        let _ = anon_map(&mut map, USER_LOW_PAGE + 4, 2);
        assert_eq!(map.find_range(2, FindDir::LoHi).unwrap(), USER_LOW_PAGE + 2);
        assert_eq!(map.find_range(3, FindDir::LoHi).unwrap(), USER_LOW_PAGE + 6);

        // An impossible request fails.
        assert!(map.find_range(USER_HIGH_PAGE, FindDir::LoHi).is_none());
    }

    #[test]
    fn map_requires_exactly_one_sharing_flag() {
        let mut map = new_map();
        for flags in [
            MapFlags::ANON,
            MapFlags::ANON | MapFlags::SHARED | MapFlags::PRIVATE,
        ] {
            assert_eq!(
                map.map(None, 0, 1, Prot::READ, flags, 0, FindDir::HiLo).err(),
                Some(Errno::EINVAL)
            );
        }
    }

    #[test]
    fn fixed_mapping_replaces() {
        let mut map = new_map();
        let start = anon_map(&mut map, USER_LOW_PAGE, 4);
        map.write_bytes(start * PAGE_SIZE, b"old").unwrap();

        let again = map
            .map(
                None,
                start,
                4,
                Prot::READ | Prot::WRITE,
                MapFlags::ANON | MapFlags::PRIVATE | MapFlags::FIXED,
                0,
                FindDir::HiLo,
            )
            .unwrap();
        assert_eq!(again, start);
        assert_eq!(map.area_count(), 1);
        let mut buf = [0u8; 3];
        map.read_bytes(start * PAGE_SIZE, &mut buf).unwrap();
        assert_eq!(&buf, b"\0\0\0");

        // Without FIXED an occupied range is refused.
        assert_eq!(
            map.map(
                None,
                start,
                1,
                Prot::READ,
                MapFlags::ANON | MapFlags::PRIVATE,
                0,
                FindDir::HiLo,
            )
            .err(),
            Some(Errno::EINVAL)
        );
    }

    #[test]
    fn remove_four_cases() {
        // Delete.
        let mut map = new_map();
        let s = anon_map(&mut map, USER_LOW_PAGE, 4);
        map.remove(s, 4).unwrap();
        assert_eq!(map.area_count(), 0);

        // Truncate right.
        let s = anon_map(&mut map, USER_LOW_PAGE, 4);
        map.remove(s + 2, 4).unwrap();
        assert_eq!(map.area_count(), 1);
        let area = map.lookup(s).unwrap();
        assert_eq!((area.start, area.end), (s, s + 2));

        // Truncate left shifts the object offset.
        map.remove(s, 1).unwrap();
        let area = map.lookup(s + 1).unwrap();
        assert_eq!((area.start, area.end), (s + 1, s + 2));
        assert_eq!(area.off, 1);
        map.remove(s + 1, 1).unwrap();

        // Split.
        let s = anon_map(&mut map, USER_LOW_PAGE, 6);
        map.write_bytes((s + 5) * PAGE_SIZE, b"tail").unwrap();
        map.remove(s + 2, 2).unwrap();
        assert_eq!(map.area_count(), 2);
        assert!(map.lookup(s + 2).is_none());
        let head = map.lookup(s).unwrap();
        assert_eq!((head.start, head.end), (s, s + 2));
        let tail = map.lookup(s + 5).unwrap();
        assert_eq!((tail.start, tail.end), (s + 4, s + 6));
        assert_eq!(tail.off, 4);
        // The tail still reads its old contents through the shared
        // offsetting.
        let mut buf = [0u8; 4];
        map.read_bytes((s + 5) * PAGE_SIZE, &mut buf).unwrap();
        assert_eq!(&buf, b"tail");
    }

    #[test]
    fn remove_purges_page_table() {
        let mut map = new_map();
        let s = anon_map(&mut map, USER_LOW_PAGE, 2);
        map.handle_pagefault(s * PAGE_SIZE, true).unwrap();
        map.handle_pagefault((s + 1) * PAGE_SIZE, true).unwrap();
        assert_eq!(map.flat_pt().mapped_count(), 2);

        map.remove(s, 1).unwrap();
        assert_eq!(map.flat_pt().mapped_count(), 1);
        assert!(map.flat_pt().translation(s).is_none());
        assert!(map.flat_pt().translation(s + 1).is_some());
    }

    #[test]
    fn pagefault_permissions() {
        let mut map = new_map();
        let s = map
            .map(
                None,
                0,
                1,
                Prot::READ,
                MapFlags::ANON | MapFlags::PRIVATE,
                0,
                FindDir::HiLo,
            )
            .unwrap();
        map.handle_pagefault(s * PAGE_SIZE, false).unwrap();
        assert_eq!(
            map.handle_pagefault(s * PAGE_SIZE, true).err(),
            Some(Errno::EACCES)
        );
        // Unmapped access.
        assert_eq!(
            map.handle_pagefault((USER_LOW_PAGE + 77) * PAGE_SIZE, false).err(),
            Some(Errno::EINVAL)
        );
    }

    #[test]
    fn private_read_fault_maps_read_only() {
        let mut map = new_map();
        let s = anon_map(&mut map, USER_LOW_PAGE, 1);
        map.handle_pagefault(s * PAGE_SIZE, false).unwrap();
        let (_, prot) = map.flat_pt().translation(s).unwrap();
        assert!(!prot.contains(Prot::WRITE));

        map.handle_pagefault(s * PAGE_SIZE, true).unwrap();
        let (_, prot) = map.flat_pt().translation(s).unwrap();
        assert!(prot.contains(Prot::WRITE));
    }

    #[test]
    fn rw_round_trip_across_page_boundary() {
        let mut map = new_map();
        let s = anon_map(&mut map, USER_LOW_PAGE, 2);
        let addr = s * PAGE_SIZE + PAGE_SIZE - 3;
        map.write_bytes(addr, b"straddle").unwrap();
        let mut buf = [0u8; 8];
        map.read_bytes(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"straddle");

        // Off the end of the mapping.
        let past = (s + 2) * PAGE_SIZE;
        assert_eq!(map.write_bytes(past, b"x").err(), Some(Errno::EINVAL));
    }

    #[test]
    fn fork_isolates_private_pages() {
        let mut parent = new_map();
        let s = anon_map(&mut parent, USER_LOW_PAGE, 2);
        let base = s * PAGE_SIZE;
        parent.write_bytes(base, &[b'X'; 2 * PAGE_SIZE]).unwrap();

        let mut child = parent.clone_into(FlatPageTable::new());

        // Child writes page 0; parent must keep seeing 'X'.
        child.write_bytes(base, b"Y").unwrap();
        let mut buf = [0u8; 1];
        parent.read_bytes(base, &mut buf).unwrap();
        assert_eq!(buf[0], b'X');
        child.read_bytes(base, &mut buf).unwrap();
        assert_eq!(buf[0], b'Y');

        // Page 1 is untouched and visible to both.
        parent.read_bytes(base + PAGE_SIZE, &mut buf).unwrap();
        assert_eq!(buf[0], b'X');
        child.read_bytes(base + PAGE_SIZE, &mut buf).unwrap();
        assert_eq!(buf[0], b'X');

        // Parent writes after the fork stay invisible to the child.
        parent.write_bytes(base + 1, b"Z").unwrap();
        child.read_bytes(base + 1, &mut buf).unwrap();
        assert_eq!(buf[0], b'X');
    }

    #[test]
    fn fork_shares_shared_mappings() {
        let mut parent = new_map();
        let s = parent
            .map(
                None,
                0,
                1,
                Prot::READ | Prot::WRITE,
                MapFlags::ANON | MapFlags::SHARED,
                0,
                FindDir::HiLo,
            )
            .unwrap();
        let base = s * PAGE_SIZE;
        let child = parent.clone_into(FlatPageTable::new());

        parent.write_bytes(base, b"both").unwrap();
        let mut buf = [0u8; 4];
        child.read_bytes(base, &mut buf).unwrap();
        assert_eq!(&buf, b"both");
    }

    #[test]
    fn fork_then_drop_collapses_chains() {
        let mut parent = new_map();
        let s = anon_map(&mut parent, USER_LOW_PAGE, 1);
        let base = s * PAGE_SIZE;
        parent.write_bytes(base, b"A").unwrap();

        // Two generations of forking build a chain of shadows.
        let child = parent.clone_into(FlatPageTable::new());
        let grandchild = parent.clone_into(FlatPageTable::new());
        drop(child);
        drop(grandchild);

        parent.collapse_shadows();
        let mut buf = [0u8; 1];
        parent.read_bytes(base, &mut buf).unwrap();
        assert_eq!(buf[0], b'A');
    }

    #[test]
    fn fixed_zero_hint_is_rejected() {
        let mut map = new_map();
        assert_eq!(
            map.map(
                None,
                0,
                1,
                Prot::READ,
                MapFlags::ANON | MapFlags::PRIVATE | MapFlags::FIXED,
                0,
                FindDir::HiLo,
            )
            .err(),
            Some(Errno::EINVAL)
        );
    }
}
