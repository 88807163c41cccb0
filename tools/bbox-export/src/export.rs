//! Turning a raw region image into text files.

use anyhow::{Context, bail};
use bbox_addresses::{PhysicalAddress, ReservedRegion, VirtualAddress};
use bbox_rdr::consts::POOL_OFFSET;
use bbox_rdr::{DumpModule, RecordView};
use bbox_safemem::{PoolError, PoolHeader, SAFEMEM_POOL_MAGIC};
use log::{info, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const BASE_INFO_FILE: &str = "base_info.txt";
pub const POOL_FILE: &str = "rdr_pool.txt";
pub const AP_ROOT_FILE: &str = "ap_root.txt";
pub const MODULE_DUMP_FILE: &str = "module_dumps.txt";

/// Load an image, placing it at the addresses it was recorded at.
///
/// The main pool's payload runs to the end of the region, so the end of
/// that payload, less the image length, is the region's base.
pub fn load_image(path: &Path) -> anyhow::Result<ReservedRegion> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let len = bytes.len() as u64;
    let at = usize::try_from(POOL_OFFSET)?;
    let header = bytes
        .get(at..)
        .map(bbox_layout::decode::<PoolHeader>)
        .transpose()?
        .context("image too short for a record head")?;
    if header.magic != SAFEMEM_POOL_MAGIC {
        bail!("no pool header in {} (magic 0x{:08x})", path.display(), header.magic);
    }
    let virt = header
        .end_alloc_addr
        .checked_sub(len)
        .context("pool end lies below the image base")?;
    let phys = header
        .phys_addr
        .checked_add(header.pool_size)
        .context("pool physical end overflows")?
        .checked_sub(len)
        .context("pool physical end lies below the image base")?;
    info!("image of {len} bytes at virt 0x{virt:x} phys 0x{phys:x}");
    Ok(ReservedRegion::from_vec(
        PhysicalAddress::new(phys),
        VirtualAddress::new(virt),
        bytes,
    ))
}

/// Validate `region` and write its text rendering into `out_dir`.
///
/// Returns the files written. A damaged AP root is reported in its file and
/// does not fail the export.
pub fn export(region: &ReservedRegion, out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let view = RecordView::open(region).context("record head does not validate")?;
    if view.corrected_bits() > 0 {
        warn!("{} bit(s) corrected in the record head", view.corrected_bits());
    }
    let recorded = view.top_head().base_address;
    if recorded != region.phys().as_u64() {
        bail!(
            "pool header places the image at phys 0x{:x}, record head says 0x{recorded:x}",
            region.phys().as_u64()
        );
    }
    let mut written = Vec::new();

    let mut text = String::new();
    view.render(&mut text)?;
    written.push(write_text(out_dir, BASE_INFO_FILE, &text)?);

    let pool = view.pool()?;
    written.push(write_text(out_dir, POOL_FILE, &pool.to_string())?);

    let mut ap = String::new();
    let mut dumps = String::new();
    match view.ap_root() {
        Ok(root) => {
            root.render(&mut ap)?;
            for module in DumpModule::ALL {
                match root.pool().get_checked(module.memid()) {
                    Ok((mem, corrected)) => writeln!(
                        dumps,
                        "{module:?}: id {} addr[0x{:x}] size[0x{:x}]{}",
                        module.memid(),
                        mem.paddr.as_u64(),
                        mem.size,
                        if corrected > 0 { " (repaired)" } else { "" }
                    )?,
                    Err(PoolError::NotFound(_)) => writeln!(dumps, "{module:?}: no slot")?,
                    Err(e) => writeln!(dumps, "{module:?}: {e}")?,
                }
            }
        }
        Err(e) => {
            warn!("AP root unusable: {e}");
            writeln!(ap, "AP root unusable: {e}")?;
            writeln!(dumps, "no module dumps without an AP root")?;
        }
    }
    written.push(write_text(out_dir, AP_ROOT_FILE, &ap)?);
    written.push(write_text(out_dir, MODULE_DUMP_FILE, &dumps)?);
    Ok(written)
}

fn write_text(dir: &Path, name: &str, text: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}
