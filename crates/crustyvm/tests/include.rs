//! `include`/`binclude` behavior: splicing, the safe-path discipline,
//! cycles and depth.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crustyvm::{Callback, CrustyVm, NoLog, SafePath, VmConfig, WriteArg};

fn canonical_dir(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().canonicalize().unwrap()
}

fn int_sink(name: &str) -> (Rc<RefCell<Vec<i32>>>, Callback) {
    let store: Rc<RefCell<Vec<i32>>> = Rc::default();
    let sink = Rc::clone(&store);
    let cb = Callback::writer(
        name,
        1,
        Box::new(move |data: WriteArg<'_>, _| {
            if let WriteArg::Ints(values) = data {
                sink.borrow_mut().extend_from_slice(values);
            }
            Ok(())
        }),
    );
    (store, cb)
}

fn build(source: &str, dir: &Path, callbacks: Vec<Callback>) -> Result<CrustyVm<NoLog>, crustyvm::CompileError> {
    let config = VmConfig {
        safe_path: SafePath::pinned(dir),
        ..VmConfig::default()
    };
    CrustyVm::new("main.cvm", source.as_bytes(), callbacks, config, NoLog)
}

#[test]
fn include_splices_lines_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    let lib = root.join("lib.cvm");
    fs::write(&lib, "macro three v\nmove v 3\nendmacro three\n").unwrap();

    let source = format!(
        "include {}\nstatic x 0\nproc init\nthree x\nmove out x\nret\n",
        lib.display()
    );
    let (store, cb) = int_sink("out");
    let mut vm = build(&source, &root, vec![cb]).unwrap();
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [3]);
}

#[test]
fn include_outside_safe_path_is_refused() {
    let inside = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let stray = canonical_dir(&outside).join("lib.cvm");
    fs::write(&stray, "static x 0\n").unwrap();

    let source = format!("include {}\nproc init\nret\n", stray.display());
    let err = build(&source, &canonical_dir(&inside), vec![]).unwrap_err();
    assert!(err.message().contains("unsafe path"), "{err}");
}

#[test]
fn first_open_pins_the_safe_path() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    fs::create_dir(root.join("sub")).unwrap();
    let first = root.join("lib.cvm");
    let second = root.join("sub").join("deeper.cvm");
    fs::write(&first, format!("include {}\n", second.display())).unwrap();
    fs::write(&second, "static marker 7\n").unwrap();

    // An unpinned loader pins itself to the first file's directory; the
    // nested include canonicalizes under it and is allowed.
    let source = format!("include {}\nproc init\nmove out marker\nret\n", first.display());
    let (store, cb) = int_sink("out");
    let config = VmConfig {
        safe_path: SafePath::new(),
        ..VmConfig::default()
    };
    let mut vm = CrustyVm::new("main.cvm", source.as_bytes(), vec![cb], config, NoLog).unwrap();
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [7]);
}

#[test]
fn cyclic_includes_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    let a = root.join("a.cvm");
    let b = root.join("b.cvm");
    fs::write(&a, format!("include {}\n", b.display())).unwrap();
    fs::write(&b, format!("include {}\n", a.display())).unwrap();

    let source = format!("include {}\nproc init\nret\n", a.display());
    let err = build(&source, &root, vec![]).unwrap_err();
    assert!(err.message().contains("circular include"), "{err}");
}

#[test]
fn include_depth_is_limited() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    // main -> d0 -> d1 -> ... -> d16: one past the limit of 16.
    for i in 0..17 {
        let path = root.join(format!("d{i}.cvm"));
        let contents = if i == 16 {
            "static bottom 1\n".to_owned()
        } else {
            format!("include {}\n", root.join(format!("d{}.cvm", i + 1)).display())
        };
        fs::write(&path, contents).unwrap();
    }
    let source = format!("include {}\nproc init\nret\n", root.join("d0.cvm").display());
    let err = build(&source, &root, vec![]).unwrap_err();
    assert!(err.message().contains("too deep"), "{err}");
}

#[test]
fn binclude_loads_ints_truncated_to_elements() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    let bin = root.join("data.bin");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&100i32.to_le_bytes());
    bytes.extend_from_slice(&200i32.to_le_bytes());
    bytes.extend_from_slice(&[0xaa, 0xbb]); // trailing partial element
    fs::write(&bin, &bytes).unwrap();

    let source = format!(
        "binclude data ints {}\nproc init\nmove out data:\nmove out data:1\nret\n",
        bin.display()
    );
    let (store, cb) = int_sink("out");
    let mut vm = build(&source, &root, vec![cb]).unwrap();
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [2, 200]);
}

#[test]
fn binclude_local_with_start_offset() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    let bin = root.join("text.bin");
    fs::write(&bin, b"xxhello").unwrap();

    let source = format!(
        "proc init\nbinclude text chars {} 2\nmove string_out text\nret\n",
        bin.display()
    );
    let captured: Rc<RefCell<Vec<u8>>> = Rc::default();
    let sink = Rc::clone(&captured);
    let cb = Callback::writer(
        "string_out",
        1,
        Box::new(move |data: WriteArg<'_>, _| {
            if let WriteArg::Chars(bytes) = data {
                sink.borrow_mut().extend_from_slice(bytes);
            }
            Ok(())
        }),
    );
    let mut vm = build(&source, &root, vec![cb]).unwrap();
    vm.run("init").unwrap();
    assert_eq!(captured.borrow()[..], *b"hello");
}

#[test]
fn binclude_range_past_eof_is_rejected_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_dir(&dir);
    let bin = root.join("short.bin");
    fs::write(&bin, &[0u8; 8]).unwrap();

    let source = format!("binclude data ints {} 4 8\nproc init\nret\n", bin.display());
    let mut log = crustyvm::CollectStringLog::new();
    let config = VmConfig {
        safe_path: SafePath::pinned(&root),
        ..VmConfig::default()
    };
    let err = CrustyVm::new("main.cvm", source.as_bytes(), vec![], config, &mut log).unwrap_err();
    assert!(err.message().contains("past the end"), "{err}");
    let warnings = log.into_string();
    assert!(warnings.contains("warning"), "{warnings}");
    assert!(warnings.contains("past the end"), "{warnings}");

    let source = format!("binclude data floats {} 4\nproc init\nret\n", bin.display());
    let err = build(&source, &root, vec![]).unwrap_err();
    assert!(err.message().contains("not large enough"), "{err}");
}

#[test]
fn binclude_outside_safe_path_is_refused() {
    let inside = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let bin = canonical_dir(&outside).join("data.bin");
    fs::write(&bin, &[0u8; 16]).unwrap();

    let source = format!("binclude data ints {}\nproc init\nret\n", bin.display());
    let err = build(&source, &canonical_dir(&inside), vec![]).unwrap_err();
    assert!(err.message().contains("unsafe path"), "{err}");
}
