//! sysfs-backed PCIe device
//!
//! The BAR is mapped through `/sys/bus/pci/devices/<bdf>/resource<N>`,
//! which needs no `/dev/mem` access and honours the kernel's lockdown
//! rules. Driver attributes are plain files below the device directory.

use std::fs;
use std::path::{Path, PathBuf};

use qspiflash_core::PcieDevice;

use crate::address::PciAddress;
use crate::error::{PcieError, Result};

/// Default sysfs directory holding one entry per PCI function
pub const SYSFS_PCI_DEVICES: &str = "/sys/bus/pci/devices";

/// A PCI function with one BAR mapped
pub struct SysfsDevice {
    address: PciAddress,
    dir: PathBuf,
    bar: u8,
    bar_offset: u64,
    map: BarMap,
}

impl SysfsDevice {
    /// Map BAR `bar` of the device at `address`
    ///
    /// Every BAR access is shifted by `bar_offset`, for boards whose
    /// management window does not start at the beginning of the BAR.
    pub fn open(address: PciAddress, bar: u8, bar_offset: u64) -> Result<Self> {
        Self::open_in(Path::new(SYSFS_PCI_DEVICES), address, bar, bar_offset)
    }

    /// Like [`SysfsDevice::open`] with a different sysfs root
    pub fn open_in(root: &Path, address: PciAddress, bar: u8, bar_offset: u64) -> Result<Self> {
        let dir = root.join(address.to_string());
        if !dir.is_dir() {
            return Err(PcieError::DeviceNotFound(address.to_string()));
        }

        let path = dir.join(format!("resource{}", bar));
        let map = BarMap::new(&path, bar)?;
        if map.size() == 0 {
            return Err(PcieError::EmptyBar {
                bdf: address.to_string(),
                bar,
            });
        }
        log::info!(
            "Mapped BAR {} of {} ({} bytes, window offset 0x{:X})",
            bar,
            address,
            map.size(),
            bar_offset
        );

        Ok(Self {
            address,
            dir,
            bar,
            bar_offset,
            map,
        })
    }

    /// Address of the device
    pub fn address(&self) -> PciAddress {
        self.address
    }

    /// Index of the mapped BAR
    pub fn bar(&self) -> u8 {
        self.bar
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<usize> {
        let start = offset
            .checked_add(self.bar_offset)
            .and_then(|o| usize::try_from(o).ok());
        match start {
            Some(start) if start.checked_add(len).is_some_and(|end| end <= self.map.size()) => {
                Ok(start)
            }
            _ => Err(PcieError::OutOfRange {
                offset,
                len,
                size: self.map.size(),
            }),
        }
    }

    /// Directory of sub-device `subdev`
    ///
    /// Sub-devices are registered as `<name>` or `<name>.<instance>`; an
    /// empty name is the device directory itself.
    fn subdev_dir(&self, subdev: &str) -> Option<PathBuf> {
        if subdev.is_empty() {
            return Some(self.dir.clone());
        }
        let prefix = format!("{}.", subdev);
        fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .find(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name == subdev || name.starts_with(&prefix)
            })
            .map(|entry| entry.path())
    }
}

impl PcieDevice for SysfsDevice {
    fn bar_read(&mut self, offset: u64, buf: &mut [u8]) -> qspiflash_core::Result<()> {
        let start = self.check_range(offset, buf.len()).map_err(|e| {
            log::error!("{}", e);
            qspiflash_core::Error::from(e)
        })?;
        self.map.read(start, buf);
        Ok(())
    }

    fn bar_write(&mut self, offset: u64, data: &[u8]) -> qspiflash_core::Result<()> {
        let start = self.check_range(offset, data.len()).map_err(|e| {
            log::error!("{}", e);
            qspiflash_core::Error::from(e)
        })?;
        self.map.write(start, data);
        Ok(())
    }

    fn attribute(&self, subdev: &str, entry: &str) -> Option<String> {
        let path = self.subdev_dir(subdev)?.join(entry);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value.trim().to_string()),
            Err(e) => {
                log::debug!("Attribute {} unavailable: {}", path.display(), e);
                None
            }
        }
    }
}

/// A memory mapped BAR resource file
#[cfg(target_os = "linux")]
struct BarMap {
    ptr: *mut u8,
    size: usize,
}

#[cfg(target_os = "linux")]
impl BarMap {
    fn new(path: &Path, bar: u8) -> Result<Self> {
        use std::os::unix::io::AsRawFd;

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| PcieError::OpenFailed {
                path: path.display().to_string(),
                source,
            })?;
        let size = file
            .metadata()
            .map_err(|source| PcieError::OpenFailed {
                path: path.display().to_string(),
                source,
            })?
            .len() as usize;
        if size == 0 {
            return Ok(Self {
                ptr: core::ptr::null_mut(),
                size: 0,
            });
        }

        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(PcieError::MapFailed {
                bar,
                size,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
        })
    }

    fn size(&self) -> usize {
        self.size
    }

    /// Copy out of the BAR, as one 32-bit access when aligned
    fn read(&self, offset: usize, buf: &mut [u8]) {
        if buf.len() == 4 && offset % 4 == 0 {
            let v = unsafe { core::ptr::read_volatile(self.ptr.add(offset) as *const u32) };
            buf.copy_from_slice(&v.to_le_bytes());
            return;
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = unsafe { core::ptr::read_volatile(self.ptr.add(offset + i)) };
        }
    }

    /// Copy into the BAR, as one 32-bit access when aligned
    fn write(&self, offset: usize, data: &[u8]) {
        if data.len() == 4 && offset % 4 == 0 {
            let v = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            unsafe { core::ptr::write_volatile(self.ptr.add(offset) as *mut u32, v) };
            return;
        }
        for (i, &b) in data.iter().enumerate() {
            unsafe { core::ptr::write_volatile(self.ptr.add(offset + i), b) };
        }
    }
}

#[cfg(target_os = "linux")]
impl Drop for BarMap {
    fn drop(&mut self) {
        if self.size != 0 {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
struct BarMap;

#[cfg(not(target_os = "linux"))]
impl BarMap {
    fn new(_path: &Path, _bar: u8) -> Result<Self> {
        Err(PcieError::Unsupported)
    }

    fn size(&self) -> usize {
        0
    }

    fn read(&self, _offset: usize, _buf: &mut [u8]) {}

    fn write(&self, _offset: usize, _data: &[u8]) {}
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Fake sysfs tree with one device holding a 4 KiB BAR 2
    fn fake_sysfs() -> (TempDir, PciAddress) {
        let root = tempfile::tempdir().unwrap();
        let address: PciAddress = "0000:03:00.0".parse().unwrap();
        let dir = root.path().join(address.to_string());
        fs::create_dir_all(dir.join("flash.m.1")).unwrap();
        fs::write(dir.join("resource2"), vec![0u8; 4096]).unwrap();
        fs::write(dir.join("resource0"), b"").unwrap();
        fs::write(dir.join("flash.m.1").join("flash_type"), "qspi_ps_x4_single\n").unwrap();
        (root, address)
    }

    #[test]
    fn test_bar_read_write() {
        let (root, address) = fake_sysfs();
        let mut dev = SysfsDevice::open_in(root.path(), address, 2, 0x100).unwrap();
        dev.bar_write(0x10, &0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        let mut buf = [0u8; 4];
        dev.bar_read(0x10, &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 0xDEAD_BEEF);
        drop(dev);

        let raw = fs::read(root.path().join(address.to_string()).join("resource2")).unwrap();
        assert_eq!(raw[0x110..0x114], 0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn test_out_of_range_access() {
        let (root, address) = fake_sysfs();
        let mut dev = SysfsDevice::open_in(root.path(), address, 2, 0).unwrap();
        let mut buf = [0u8; 4];
        assert!(dev.bar_read(4094, &mut buf).is_err());
        assert!(dev.bar_write(u64::MAX, &buf).is_err());
    }

    #[test]
    fn test_attribute_lookup() {
        let (root, address) = fake_sysfs();
        let dev = SysfsDevice::open_in(root.path(), address, 2, 0).unwrap();
        assert_eq!(
            dev.attribute("flash", "flash_type").as_deref(),
            Some("qspi_ps_x4_single")
        );
        assert_eq!(dev.attribute("", "flash_type"), None);
        assert_eq!(dev.attribute("xmc", "flash_type"), None);
    }

    #[test]
    fn test_missing_device_and_empty_bar() {
        let (root, address) = fake_sysfs();
        let other: PciAddress = "0000:04:00.0".parse().unwrap();
        assert!(matches!(
            SysfsDevice::open_in(root.path(), other, 2, 0),
            Err(PcieError::DeviceNotFound(_))
        ));
        assert!(matches!(
            SysfsDevice::open_in(root.path(), address, 0, 0),
            Err(PcieError::EmptyBar { .. })
        ));
    }

    #[test]
    fn test_sysfs_trees_are_separate_and_removed() {
        let (first, address) = fake_sysfs();
        let (second, _) = fake_sysfs();
        assert_ne!(first.path(), second.path());

        let mut dev = SysfsDevice::open_in(first.path(), address, 2, 0).unwrap();
        dev.bar_write(0, &[1, 2, 3, 4]).unwrap();
        drop(dev);
        let raw = fs::read(second.path().join(address.to_string()).join("resource2")).unwrap();
        assert_eq!(raw[..4], [0, 0, 0, 0]);

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }
}
