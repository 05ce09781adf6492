use std::{fmt::Write as _, hint::black_box, time::Duration};

use criterion::{Criterion, criterion_group, criterion_main};
use debundle::{Config, unbundle};

/// A webpack 5 bundle of `count` modules, each importing its predecessor
fn generate_bundle(count: usize) -> String {
    let mut bundle = String::from("/******/ (() => {\n/******/ \tvar __webpack_modules__ = ({\n\n");
    for index in 0..count {
        let mut body = String::from("__webpack_require__.r(__webpack_exports__);\n");
        let _ = writeln!(
            body,
            "/* harmony export */ __webpack_require__.d(__webpack_exports__, {{\n/* harmony export */   \"Widget{index}\": () => (/* binding */ Widget{index})\n/* harmony export */ }});"
        );
        if index > 0 {
            let previous = index - 1;
            let _ = writeln!(
                body,
                "/* harmony import */ var _Widget{previous}_js__WEBPACK_IMPORTED_MODULE_0__ = __webpack_require__(/*! ./Widget{previous}.js */ \"./src/Widget{previous}.js\");\n\nclass Widget{index} extends _Widget{previous}_js__WEBPACK_IMPORTED_MODULE_0__.Widget{previous} {{\n  render() {{\n    return {index};\n  }}\n}}"
            );
        } else {
            body.push_str("\nclass Widget0 {\n  render() {\n    return 0;\n  }\n}\n");
        }
        let _ = write!(
            bundle,
            "/***/ \"./src/Widget{index}.js\":\n/***/ ((__unused_webpack_module, __webpack_exports__, __webpack_require__) => {{\n\n{body}\n/***/ }}),\n\n"
        );
    }
    bundle.push_str("/******/ \t});\n/******/ })();\n");
    bundle
}

fn benchmark_unbundle(c: &mut Criterion) {
    let mut group = c.benchmark_group("unbundle");
    group.measurement_time(Duration::from_secs(10));

    let config = Config::default();
    for count in [10, 200] {
        let bundle = generate_bundle(count);
        group.bench_function(format!("webpack5_{count}_modules"), |b| {
            b.iter(|| unbundle(black_box(&bundle), &config).expect("bundle unpacks"));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_unbundle);
criterion_main!(benches);
