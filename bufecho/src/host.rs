use alloc::string::{String, ToString};
use core::ops::Range;

use wasmi::{Caller, Extern, Func, Instance, Memory, WasmParams, WasmResults};

use crate::echo::{self, MARKER_LEN, OUTPUT_LEN};
use crate::BufEchoError;

/// Import module the host functions are provided under
pub const HOST_MODULE: &str = "env";

/// Import name of the buffer echo host function
pub const HELLO_IMPORT: &str = "hello";

/// Guest export used to allocate returned buffers in guest memory
pub const ALLOC_EXPORT: &str = "alloc";

/// Guest export holding the linear memory
pub const MEMORY_EXPORT: &str = "memory";

pub const DEFAULT_ENTRY: &str = "run";

pub const DEFAULT_FUEL_PER_CALL: u64 = 100_000;

/// Host side state attached to the store of every [Guest]
#[derive(Debug, Default)]
pub struct HostState {
    /// Number of successful calls to the `hello` import
    pub hello_calls: u64,
}

/// A guest module with the `hello` host function linked in
///
/// The guest passes a pointer and a length into its own linear memory. The host marks that region,
/// asks the guest's allocator for [OUTPUT_LEN] fresh bytes, fills them, and returns the pointer. From
/// then on the guest owns that allocation.
pub struct Guest {
    /// Name of this guest
    pub name: String,

    /// Wasm store of this [Guest]
    pub store: wasmi::Store<HostState>,

    /// Wasm instance of this [Guest]
    pub instance: Instance,

    /// Upper limit of fuel available per call into this guest
    pub fuel_per_call: u64,
}

pub fn initialize_wasm() -> (wasmi::Engine, wasmi::Store<HostState>) {
    let mut config = wasmi::Config::default();
    config.consume_fuel(true);
    let engine = wasmi::Engine::new(&config);
    let store = wasmi::Store::new(&engine, HostState::default());
    (engine, store)
}

/// Define all host functions on `linker`
pub fn link_host(
    store: &mut wasmi::Store<HostState>,
    linker: &mut wasmi::Linker<HostState>,
) -> Result<(), BufEchoError> {
    let hello = Func::wrap(
        &mut *store,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> Result<u32, wasmi::Error> {
            host_hello(&mut caller, ptr, len).map_err(|e| wasmi::Error::new(e.to_string()))
        },
    );

    linker
        .define(HOST_MODULE, HELLO_IMPORT, hello)
        .map_err(|e| {
            error!("could not define {HOST_MODULE}::{HELLO_IMPORT}: {e}");
            BufEchoError::WasmLoadError
        })?;
    Ok(())
}

fn host_hello(caller: &mut Caller<'_, HostState>, ptr: u32, len: u32) -> Result<u32, BufEchoError> {
    trace!("hello({ptr:#x}, {len}) called by guest");

    let memory = caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or(BufEchoError::NoSuchWasmMemory)
        .inspect_err(|_| error!("guest has no memory named {MEMORY_EXPORT:?}"))?;

    let len = len as usize;
    if len < MARKER_LEN {
        error!("guest buffer of {len} bytes is too small");
        return Err(BufEchoError::BufferTooSmall {
            expected: MARKER_LEN,
            got: len,
        });
    }
    let input = region(ptr, len, memory.data(&*caller).len())?;

    // the guest allocator may run arbitrary code, so nothing is written before it returned
    let alloc = caller
        .get_export(ALLOC_EXPORT)
        .and_then(Extern::into_func)
        .ok_or_else(|| BufEchoError::MissingGuestExport(ALLOC_EXPORT.into()))
        .inspect_err(|_| error!("guest has no {ALLOC_EXPORT:?} function"))?
        .typed::<u32, u32>(&*caller)
        .map_err(|_| {
            error!("guest {ALLOC_EXPORT:?} does not have type (i32) -> i32");
            BufEchoError::UnexpectedWasmType
        })?;
    let out_ptr = alloc
        .call(&mut *caller, OUTPUT_LEN as u32)
        .map_err(|e| BufEchoError::GuestTrap(e.to_string()))?;
    trace!("guest allocated {OUTPUT_LEN} bytes at {out_ptr:#x}");

    let data = memory.data_mut(&mut *caller);
    let output = region(out_ptr, OUTPUT_LEN, data.len())?;
    if overlaps(&input, &output) {
        error!("guest allocation {output:?} overlaps input {input:?}");
        return Err(BufEchoError::AliasedAllocation(output.start));
    }

    let (input, output) = split_regions(data, input, output);
    echo::hello_into(input, output)?;

    caller.data_mut().hello_calls += 1;
    Ok(out_ptr)
}

/// Range of `len` bytes at `ptr`, if it fits into `memory_size`
fn region(ptr: u32, len: usize, memory_size: usize) -> Result<Range<usize>, BufEchoError> {
    let start = ptr as usize;
    match start.checked_add(len) {
        Some(end) if end <= memory_size => Ok(start..end),
        _ => {
            error!("region {start:#x}+{len} exceeds guest memory of {memory_size} bytes");
            Err(BufEchoError::OutOfBounds {
                ptr: start,
                len,
                memory_size,
            })
        }
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Borrow two non-overlapping regions of `data` mutably at the same time
fn split_regions(data: &mut [u8], a: Range<usize>, b: Range<usize>) -> (&mut [u8], &mut [u8]) {
    debug_assert!(!overlaps(&a, &b));
    if a.start < b.start {
        let b_len = b.len();
        let (lo, hi) = data.split_at_mut(b.start);
        (&mut lo[a], &mut hi[..b_len])
    } else {
        let a_len = a.len();
        let (lo, hi) = data.split_at_mut(a.start);
        (&mut hi[..a_len], &mut lo[b])
    }
}

impl Guest {
    /// Load a guest from a `.wasm` file, or a `.wat` file in text format
    #[cfg(feature = "std")]
    pub fn load<P: AsRef<std::path::Path>>(name: &str, path: P) -> Result<Self, BufEchoError> {
        let path = path.as_ref();
        trace!("loading guest {name:?} from {path:?}");

        let wasm_bytes = if path.extension().is_some_and(|ext| ext == "wat") {
            wat::parse_file(path).map_err(|e| {
                error!("could not parse wat file {path:?}: {e}");
                BufEchoError::WasmLoadError
            })?
        } else {
            std::fs::read(path).map_err(|e| {
                error!("could not open file {path:?}: {e}");
                BufEchoError::WasmLoadError
            })?
        };

        Self::from_bytes(name, &wasm_bytes)
    }

    /// Parse, link and start a guest module
    pub fn from_bytes(name: &str, wasm: &[u8]) -> Result<Self, BufEchoError> {
        let (engine, mut store) = initialize_wasm();

        trace!("parsing wasm module of {name:?}");
        let module = wasmi::Module::new(&engine, wasm).map_err(|e| {
            error!("could not load wasm module: {e}");
            BufEchoError::WasmLoadError
        })?;

        trace!("linking wasm module");
        let mut linker = <wasmi::Linker<HostState>>::new(&engine);
        link_host(&mut store, &mut linker)?;
        let instance = linker.instantiate(&mut store, &module).map_err(|e| {
            error!("could not link wasm module {name:?}: {e}");
            BufEchoError::WasmLoadError
        })?;

        trace!("starting wasm module");
        store.set_fuel(DEFAULT_FUEL_PER_CALL).map_err(|e| {
            error!("could not fuel wasm module {name:?}: {e}");
            BufEchoError::WasmLoadError
        })?;
        let instance = instance.start(&mut store).map_err(|e| {
            error!("could not start wasm module {name:?}: {e}");
            BufEchoError::WasmLoadError
        })?;

        Ok(Self {
            name: name.into(),
            store,
            instance,
            fuel_per_call: DEFAULT_FUEL_PER_CALL,
        })
    }

    /// Checks that the guest can take part in a buffer exchange
    ///
    /// # Checks
    ///
    /// - it exports a memory named [MEMORY_EXPORT]
    /// - it exports an allocator [ALLOC_EXPORT] of type `(i32) -> i32`
    /// - it exports `entry` of type `() -> i32`
    pub fn validate(&self, entry: &str) -> Result<(), BufEchoError> {
        debug!("checking existence of {:?} memory {MEMORY_EXPORT:?}", self.name);
        self.memory()?;

        debug!("checking existence of {:?} allocator {ALLOC_EXPORT:?}", self.name);
        self.typed_func::<u32, u32>(ALLOC_EXPORT)?;

        debug!("checking existence of {:?} entry function {entry:?}", self.name);
        self.typed_func::<(), i32>(entry)?;

        info!("guest {:?} is valid", self.name);
        Ok(())
    }

    fn typed_func<P: WasmParams, R: WasmResults>(
        &self,
        ident: &str,
    ) -> Result<wasmi::TypedFunc<P, R>, BufEchoError> {
        self.instance
            .get_func(&self.store, ident)
            .ok_or_else(|| BufEchoError::MissingGuestExport(ident.into()))
            .inspect_err(|_| error!("wasm function {ident:?} not found in {:?}", self.name))?
            .typed::<P, R>(&self.store)
            .map_err(|_| {
                error!(
                    "wasm function {ident:?} of {:?} has mismatching type signature",
                    self.name
                );
                BufEchoError::UnexpectedWasmType
            })
    }

    /// Call the guest export `ident`, refuelling to [Self::fuel_per_call] first
    pub fn call<P: WasmParams, R: WasmResults>(
        &mut self,
        ident: &str,
        params: P,
    ) -> Result<R, BufEchoError> {
        let func = self.typed_func::<P, R>(ident)?;

        debug!("giving {} fuel to {:?}", self.fuel_per_call, self.name);
        self.store
            .set_fuel(self.fuel_per_call)
            .map_err(|e| BufEchoError::GuestTrap(e.to_string()))?;

        let result = func.call(&mut self.store, params).map_err(|e| {
            error!("calling {ident:?} of {:?} trapped: {e}", self.name);
            BufEchoError::GuestTrap(e.to_string())
        });

        if let Ok(left) = self.store.get_fuel() {
            debug!(
                "{:?} consumed {} fuel in {ident:?}",
                self.name,
                self.fuel_per_call.saturating_sub(left)
            );
        }
        result
    }

    /// Call the entry function, which takes no arguments and returns an `i32`
    pub fn call_entry(&mut self, entry: &str) -> Result<i32, BufEchoError> {
        self.call::<(), i32>(entry, ())
    }

    /// Allocate `len` bytes through the guest's own allocator
    pub fn alloc(&mut self, len: u32) -> Result<u32, BufEchoError> {
        self.call::<u32, u32>(ALLOC_EXPORT, len)
    }

    pub fn memory(&self) -> Result<Memory, BufEchoError> {
        self.instance
            .get_memory(&self.store, MEMORY_EXPORT)
            .ok_or(BufEchoError::NoSuchWasmMemory)
            .inspect_err(|_| {
                error!(
                    "no memory named {MEMORY_EXPORT:?} was found in wasm module {:?}",
                    self.name
                )
            })
    }

    /// Get a shared ref to `len` bytes of guest memory at `ptr`
    pub fn read(&self, ptr: u32, len: usize) -> Result<&[u8], BufEchoError> {
        let data = self.memory()?.data(&self.store);
        let range = region(ptr, len, data.len())?;
        Ok(&data[range])
    }

    /// Copy `bytes` into guest memory at `ptr`
    pub fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), BufEchoError> {
        let data = self.memory()?.data_mut(&mut self.store);
        let range = region(ptr, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Number of times this guest successfully called the `hello` import
    pub fn hello_calls(&self) -> u64 {
        self.store.data().hello_calls
    }
}
