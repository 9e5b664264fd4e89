//! Host simulator for the unit tests
//!
//! Stands in for the platform: paged user memory with holes, a RAM
//! filesystem, a capturing console, one host thread per process, and a
//! loader whose programs are Rust closures. Programs talk to the kernel
//! only through trap frames placed in their simulated stack, exactly like
//! user code would.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use spin::Mutex;

use crate::config::KernelConfig;
use crate::drivers::ConsoleDevice;
use crate::exception::{TrapCause, TrapDisposition, TrapFrame, UserContext};
use crate::fs::{FileSystem, FileSystemLock, OpenFile};
use crate::kernel::{Kernel, KernelServices};
use crate::mm::{Access, Fault, UserAddr, UserMemory, PAGE_SIZE, PHYS_BASE, WORD_SIZE};
use crate::process::{LoadError, LoadedImage, Loader, Pid, Scheduler, SpawnError, UserProgram};
use crate::syscall::numbers::*;

/// One read-only page.
pub const RODATA_BASE: usize = 0x0804_0000;
/// Writable data pages used for strings and buffers.
pub const DATA_BASE: usize = 0x0804_8000;
pub const DATA_PAGES: usize = 16;
/// Where programs build their syscall frames.
const SYSCALL_ESP: usize = PHYS_BASE - 64;

// ── memory ──

struct SimPage {
    bytes: Box<[u8; PAGE_SIZE]>,
    writable: bool,
}

/// Sparse paged address space.
pub struct SimMemory {
    pages: Mutex<BTreeMap<usize, SimPage>>,
}

impl SimMemory {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(BTreeMap::new()),
        }
    }

    /// Read-only page, data pages, and one stack page ending at `PHYS_BASE`.
    pub fn standard() -> Self {
        let mem = Self::new();
        mem.map(RODATA_BASE, 1, false);
        mem.map(DATA_BASE, DATA_PAGES, true);
        mem.map(PHYS_BASE - PAGE_SIZE, 1, true);
        mem
    }

    pub fn map(&self, base: usize, count: usize, writable: bool) {
        let mut pages = self.pages.lock();
        for index in 0..count {
            pages.insert(
                base + index * PAGE_SIZE,
                SimPage {
                    bytes: Box::new([0; PAGE_SIZE]),
                    writable,
                },
            );
        }
    }

    fn with_byte<R>(&self, addr: UserAddr, access: Access, op: impl FnOnce(&mut u8) -> R) -> Result<R, Fault> {
        let fault = Fault::new(addr, access);
        if !addr.is_user() {
            return Err(fault);
        }
        let mut pages = self.pages.lock();
        let page = pages.get_mut(&addr.align_down().as_usize()).ok_or(fault)?;
        if access.contains(Access::WRITE) && !page.writable {
            return Err(fault);
        }
        Ok(op(&mut page.bytes[addr.page_offset()]))
    }
}

impl UserMemory for SimMemory {
    fn probe(&self, addr: UserAddr, access: Access) -> Result<u8, Fault> {
        self.with_byte(addr, access, |byte| *byte)
    }

    fn read_bytes(&self, addr: UserAddr, buf: &mut [u8]) -> Result<(), Fault> {
        for (offset, slot) in buf.iter_mut().enumerate() {
            let at = addr
                .checked_add(offset)
                .ok_or(Fault::new(addr, Access::READ))?;
            *slot = self.with_byte(at, Access::READ, |byte| *byte)?;
        }
        Ok(())
    }

    fn write_bytes(&self, addr: UserAddr, data: &[u8]) -> Result<(), Fault> {
        for (offset, &value) in data.iter().enumerate() {
            let at = addr
                .checked_add(offset)
                .ok_or(Fault::new(addr, Access::WRITE))?;
            self.with_byte(at, Access::WRITE, |byte| *byte = value)?;
        }
        Ok(())
    }
}

// ── filesystem ──

struct Inode {
    data: Vec<u8>,
    deny_write: usize,
}

/// Flat in-memory filesystem. Files never grow past their created size.
pub struct RamFs {
    files: Mutex<HashMap<String, Arc<Mutex<Inode>>>>,
    open_handles: Arc<AtomicUsize>,
}

impl RamFs {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn insert(&self, name: &str, contents: &[u8]) {
        let inode = Inode {
            data: contents.to_vec(),
            deny_write: 0,
        };
        self.files
            .lock()
            .insert(name.to_string(), Arc::new(Mutex::new(inode)));
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let files = self.files.lock();
        let inode = files.get(name)?;
        let data = inode.lock().data.clone();
        Some(data)
    }

    /// Handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl FileSystem for RamFs {
    fn create(&self, name: &str, initial_size: u32) -> bool {
        let mut files = self.files.lock();
        if name.is_empty() || files.contains_key(name) {
            return false;
        }
        let inode = Inode {
            data: vec![0; initial_size as usize],
            deny_write: 0,
        };
        files.insert(name.to_string(), Arc::new(Mutex::new(inode)));
        true
    }

    fn remove(&self, name: &str) -> bool {
        self.files.lock().remove(name).is_some()
    }

    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>> {
        let inode = self.files.lock().get(name)?.clone();
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(RamFile {
            inode,
            position: 0,
            denying: false,
            open_handles: self.open_handles.clone(),
        }))
    }
}

struct RamFile {
    inode: Arc<Mutex<Inode>>,
    position: u32,
    denying: bool,
    open_handles: Arc<AtomicUsize>,
}

impl OpenFile for RamFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let inode = self.inode.lock();
        let start = (self.position as usize).min(inode.data.len());
        let count = buf.len().min(inode.data.len() - start);
        buf[..count].copy_from_slice(&inode.data[start..start + count]);
        self.position += count as u32;
        count
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let mut inode = self.inode.lock();
        if inode.deny_write > 0 {
            return 0;
        }
        let start = (self.position as usize).min(inode.data.len());
        let count = buf.len().min(inode.data.len() - start);
        inode.data[start..start + count].copy_from_slice(&buf[..count]);
        self.position += count as u32;
        count
    }

    fn length(&self) -> u32 {
        self.inode.lock().data.len() as u32
    }

    fn seek(&mut self, position: u32) {
        self.position = position;
    }

    fn tell(&self) -> u32 {
        self.position
    }

    fn deny_write(&mut self) {
        if !self.denying {
            self.denying = true;
            self.inode.lock().deny_write += 1;
        }
    }

    fn allow_write(&mut self) {
        if self.denying {
            self.denying = false;
            self.inode.lock().deny_write -= 1;
        }
    }
}

impl Drop for RamFile {
    fn drop(&mut self) {
        self.allow_write();
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── console ──

/// Console device capturing output and replaying canned keyboard input.
pub struct BufferDevice {
    output: Arc<Mutex<Vec<u8>>>,
    input: VecDeque<u8>,
}

impl BufferDevice {
    pub fn new(input: &[u8]) -> Self {
        Self {
            output: Arc::new(Mutex::new(Vec::new())),
            input: input.iter().copied().collect(),
        }
    }

    pub fn output(&self) -> Arc<Mutex<Vec<u8>>> {
        self.output.clone()
    }
}

impl ConsoleDevice for BufferDevice {
    fn write_byte(&mut self, byte: u8) {
        self.output.lock().push(byte);
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }
}

// ── scheduler ──

/// One host thread per kernel thread.
pub struct ThreadScheduler {
    threads: Mutex<Vec<JoinHandle<()>>>,
    powered_off: AtomicBool,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(Vec::new()),
            powered_off: AtomicBool::new(false),
        }
    }

    pub fn is_powered_off(&self) -> bool {
        self.powered_off.load(Ordering::SeqCst)
    }

    /// Join every thread spawned so far, including ones spawned meanwhile.
    pub fn join_all(&self) {
        loop {
            let handle = self.threads.lock().pop();
            match handle {
                Some(handle) => {
                    let _ = handle.join();
                }
                None => break,
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn(&self, name: &str, entry: Box<dyn FnOnce() + Send + 'static>) -> Result<(), SpawnError> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(entry)
            .map_err(|_| SpawnError::OutOfResources)?;
        self.threads.lock().push(handle);
        Ok(())
    }

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn power_off(&self) {
        self.powered_off.store(true, Ordering::SeqCst);
    }
}

// ── loader and user programs ──

type Body = Arc<dyn Fn(&mut Sys<'_>) -> i32 + Send + Sync>;

/// Loads registered closures as programs. The executable file, if the
/// filesystem has one with the program's name, is opened and write-denied.
pub struct SimLoader {
    programs: Mutex<HashMap<String, Body>>,
}

impl SimLoader {
    pub fn new() -> Self {
        Self {
            programs: Mutex::new(HashMap::new()),
        }
    }
}

impl Loader for SimLoader {
    fn load(&self, cmdline: &str, fs: &FileSystemLock) -> Result<LoadedImage, LoadError> {
        let args: Vec<String> = cmdline.split_whitespace().map(String::from).collect();
        let name = args.first().ok_or(LoadError::NotFound)?;
        let body = self
            .programs
            .lock()
            .get(name)
            .cloned()
            .ok_or(LoadError::NotFound)?;

        let executable = fs.with_fs(|fs| fs.open(name)).map(|mut file| {
            fs.with_file(file.as_mut(), |f| f.deny_write());
            file
        });
        let memory = Arc::new(SimMemory::standard());

        Ok(LoadedImage {
            memory: memory.clone(),
            executable,
            program: Box::new(SimProgram { body, memory, args }),
        })
    }
}

struct SimProgram {
    body: Body,
    memory: Arc<SimMemory>,
    args: Vec<String>,
}

impl UserProgram for SimProgram {
    fn run(self: Box<Self>, ctx: &UserContext) {
        let SimProgram { body, memory, args } = *self;
        let mut sys = Sys {
            ctx,
            memory,
            args,
            heap: DATA_BASE,
            exited: false,
        };
        // Like a C runtime: returning from main exits with its value.
        let status = body(&mut sys);
        if !sys.exited {
            sys.exit(status);
        }
    }
}

/// User-side system call library of a simulated program.
pub struct Sys<'a> {
    ctx: &'a UserContext,
    memory: Arc<SimMemory>,
    args: Vec<String>,
    heap: usize,
    exited: bool,
}

impl Sys<'_> {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Copy raw bytes into the data pages and return their user address.
    pub fn alloc(&mut self, data: &[u8]) -> u32 {
        let len = data.len().max(1);
        if self.heap + len > DATA_BASE + DATA_PAGES * PAGE_SIZE {
            self.heap = DATA_BASE;
        }
        let addr = self.heap;
        self.heap += len;
        let _ = self.memory.write_bytes(UserAddr::new(addr), data);
        addr as u32
    }

    fn alloc_str(&mut self, s: &str) -> u32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.alloc(&bytes)
    }

    fn peek(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut data = vec![0; len];
        let _ = self.memory.read_bytes(UserAddr::from(addr), &mut data);
        data
    }

    pub fn poke_word(&self, addr: u32, word: u32) {
        let _ = self
            .memory
            .write_bytes(UserAddr::from(addr), &word.to_le_bytes());
    }

    /// Trap with the stack pointer at `esp`. Once the process is gone this
    /// returns -1 without entering the kernel.
    pub fn trap_at(&mut self, esp: u32) -> i32 {
        if self.exited {
            return -1;
        }
        let mut frame = TrapFrame::new(esp);
        if self.ctx.syscall(&mut frame) != TrapDisposition::Resume {
            self.exited = true;
        }
        frame.result()
    }

    /// Push a call number and arguments and trap.
    pub fn syscall(&mut self, number: u32, args: &[u32]) -> i32 {
        let esp = SYSCALL_ESP as u32;
        self.poke_word(esp, number);
        for (index, &arg) in args.iter().enumerate() {
            self.poke_word(esp + ((index + 1) * WORD_SIZE) as u32, arg);
        }
        self.trap_at(esp)
    }

    /// Touch an inaccessible address.
    pub fn fault(&mut self, addr: u32) {
        if self.exited {
            return;
        }
        let mut frame = TrapFrame::new(SYSCALL_ESP as u32);
        let cause = TrapCause::PageFault(UserAddr::from(addr));
        if self.ctx.trap(cause, &mut frame) != TrapDisposition::Resume {
            self.exited = true;
        }
    }

    pub fn halt(&mut self) {
        self.syscall(SYS_HALT, &[]);
    }

    pub fn exit(&mut self, status: i32) {
        self.syscall(SYS_EXIT, &[status as u32]);
    }

    pub fn exec(&mut self, cmdline: &str) -> i32 {
        let cmdline = self.alloc_str(cmdline);
        self.syscall(SYS_EXEC, &[cmdline])
    }

    pub fn wait(&mut self, pid: i32) -> i32 {
        self.syscall(SYS_WAIT, &[pid as u32])
    }

    pub fn create(&mut self, name: &str, size: u32) -> bool {
        let name = self.alloc_str(name);
        self.syscall(SYS_CREATE, &[name, size]) != 0
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let name = self.alloc_str(name);
        self.syscall(SYS_REMOVE, &[name]) != 0
    }

    pub fn open(&mut self, name: &str) -> i32 {
        let name = self.alloc_str(name);
        self.syscall(SYS_OPEN, &[name])
    }

    pub fn filesize(&mut self, fd: i32) -> i32 {
        self.syscall(SYS_FILESIZE, &[fd as u32])
    }

    pub fn read(&mut self, fd: i32, len: usize) -> (i32, Vec<u8>) {
        let buffer = self.alloc(&vec![0; len]);
        let count = self.syscall(SYS_READ, &[fd as u32, buffer, len as u32]);
        let data = if count > 0 {
            self.peek(buffer, count as usize)
        } else {
            Vec::new()
        };
        (count, data)
    }

    pub fn write(&mut self, fd: i32, data: &[u8]) -> i32 {
        let buffer = self.alloc(data);
        self.syscall(SYS_WRITE, &[fd as u32, buffer, data.len() as u32])
    }

    pub fn print(&mut self, text: &str) {
        self.write(1, text.as_bytes());
    }

    pub fn seek(&mut self, fd: i32, position: u32) {
        self.syscall(SYS_SEEK, &[fd as u32, position]);
    }

    pub fn tell(&mut self, fd: i32) -> i32 {
        self.syscall(SYS_TELL, &[fd as u32])
    }

    pub fn close(&mut self, fd: i32) {
        self.syscall(SYS_CLOSE, &[fd as u32]);
    }

    // Kernel-side views for test assertions.

    pub fn live_processes(&self) -> usize {
        self.ctx.kernel().processes().len()
    }

    /// True once every pid in `pids` has recorded its exit.
    pub fn all_exited(&self, pids: &[i32]) -> bool {
        let processes = self.ctx.kernel().processes();
        pids.iter().all(|&pid| {
            Pid::from_raw(pid)
                .and_then(|pid| processes.get(pid))
                .map_or(true, |pcb| pcb.is_completed())
        })
    }

    /// Child edges still held by this process.
    pub fn child_links(&self) -> usize {
        self.ctx
            .kernel()
            .processes()
            .get(self.ctx.pid())
            .map_or(0, |pcb| pcb.child_count())
    }

    pub fn open_files(&self) -> usize {
        self.ctx
            .kernel()
            .processes()
            .get(self.ctx.pid())
            .map_or(0, |pcb| pcb.fd_table().open_count())
    }
}

// ── whole machine ──

pub struct Sim {
    pub kernel: Arc<Kernel>,
    pub scheduler: Arc<ThreadScheduler>,
    pub fs: Arc<RamFs>,
    loader: Arc<SimLoader>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl Sim {
    pub fn new() -> Self {
        Self::build(KernelConfig::default(), b"")
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self::build(config, b"")
    }

    pub fn with_input(input: &[u8]) -> Self {
        Self::build(KernelConfig::default(), input)
    }

    fn build(config: KernelConfig, input: &[u8]) -> Self {
        let scheduler = Arc::new(ThreadScheduler::new());
        let fs = Arc::new(RamFs::new());
        let loader = Arc::new(SimLoader::new());
        let device = BufferDevice::new(input);
        let output = device.output();

        let kernel = Kernel::new(
            config,
            KernelServices {
                scheduler: scheduler.clone(),
                loader: loader.clone(),
                filesystem: fs.clone(),
                console: Box::new(device),
            },
        );

        Self {
            kernel,
            scheduler,
            fs,
            loader,
            output,
        }
    }

    pub fn program(&self, name: &str, body: impl Fn(&mut Sys<'_>) -> i32 + Send + Sync + 'static) {
        self.loader
            .programs
            .lock()
            .insert(name.to_string(), Arc::new(body));
    }

    pub fn fs_file(&self, name: &str, contents: &[u8]) {
        self.fs.insert(name, contents);
    }

    /// Run `cmdline` as the initial process, then join every thread.
    pub fn run(&self, cmdline: &str) -> i32 {
        let status = self.kernel.run_initial(cmdline).unwrap_or(-1);
        self.join();
        status
    }

    pub fn join(&self) {
        self.scheduler.join_all();
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }
}
