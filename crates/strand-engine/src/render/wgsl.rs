//! Composed WGSL sources.
//!
//! Shared snippets are prepended with `concat!` so every pass compiles from a
//! single self-contained string.

pub(crate) const PPLL_STORE: &str = concat!(
    include_str!("shaders/msm_common.wgsl"),
    include_str!("shaders/hair_common.wgsl"),
    include_str!("shaders/ppll_common.wgsl"),
    include_str!("shaders/ppll_depth.wgsl"),
    include_str!("shaders/ppll_store.wgsl"),
);

pub(crate) const PPLL_STORE_MSAA: &str = concat!(
    include_str!("shaders/msm_common.wgsl"),
    include_str!("shaders/hair_common.wgsl"),
    include_str!("shaders/ppll_common.wgsl"),
    include_str!("shaders/ppll_depth_msaa.wgsl"),
    include_str!("shaders/ppll_store.wgsl"),
);

pub(crate) const PPLL_BLEND: &str = concat!(
    include_str!("shaders/ppll_common.wgsl"),
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/ppll_blend.wgsl"),
);

pub(crate) const MSM_DEPTH: &str = concat!(
    include_str!("shaders/msm_common.wgsl"),
    include_str!("shaders/msm_depth.wgsl"),
);

pub(crate) const MSM_DEPTH_HAIR: &str = concat!(
    include_str!("shaders/msm_common.wgsl"),
    include_str!("shaders/hair_common.wgsl"),
    include_str!("shaders/msm_depth_hair.wgsl"),
);

pub(crate) const MSM_FILTER: &str = include_str!("shaders/msm_filter.wgsl");

pub(crate) const PLATTE: &str = concat!(
    include_str!("shaders/msm_common.wgsl"),
    include_str!("shaders/platte.wgsl"),
);

pub(crate) const PRESENT: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/present.wgsl"),
);

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(name: &str, source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|e| panic!("{name}: {}", e.emit_to_string(source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("{name}: {e:?}"));
        module
    }

    fn entry_points(module: &naga::Module) -> Vec<&str> {
        let mut names: Vec<&str> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn struct_size(module: &naga::Module, name: &str) -> usize {
        let mut layouter = naga::proc::Layouter::default();
        layouter.update(module.to_ctx()).unwrap();
        let (handle, _) = module
            .types
            .iter()
            .find(|(_, t)| t.name.as_deref() == Some(name))
            .unwrap_or_else(|| panic!("struct {name} not declared"));
        layouter[handle].size as usize
    }

    /// Flattens a module-scope `const` into its float components, columns first.
    fn const_floats(module: &naga::Module, name: &str) -> Vec<f32> {
        fn flatten(module: &naga::Module, expr: naga::Handle<naga::Expression>, out: &mut Vec<f32>) {
            match &module.global_expressions[expr] {
                naga::Expression::Literal(naga::Literal::F32(v)) => out.push(*v),
                naga::Expression::Literal(naga::Literal::AbstractFloat(v)) => out.push(*v as f32),
                naga::Expression::Literal(naga::Literal::U32(v)) => out.push(*v as f32),
                naga::Expression::Compose { components, .. } => {
                    for &c in components {
                        flatten(module, c, out);
                    }
                }
                naga::Expression::Constant(c) => flatten(module, module.constants[*c].init, out),
                naga::Expression::Unary {
                    op: naga::UnaryOperator::Negate,
                    expr,
                } => {
                    let start = out.len();
                    flatten(module, *expr, out);
                    for v in &mut out[start..] {
                        *v = -*v;
                    }
                }
                other => panic!("unexpected constant expression {other:?}"),
            }
        }

        let (_, constant) = module
            .constants
            .iter()
            .find(|(_, c)| c.name.as_deref() == Some(name))
            .unwrap_or_else(|| panic!("const {name} not declared"));
        let mut out = Vec::new();
        flatten(module, constant.init, &mut out);
        out
    }

    fn assert_floats_eq(name: &str, got: &[f32], expected: &[f32]) {
        assert_eq!(got.len(), expected.len(), "{name}");
        for (i, (g, e)) in got.iter().zip(expected).enumerate() {
            assert!((g - e).abs() <= 1e-6 * e.abs().max(1.0), "{name}[{i}]: {g} vs {e}");
        }
    }

    // ── validation ────────────────────────────────────────────────────────

    #[test]
    fn all_sources_validate() {
        for (name, src) in [
            ("ppll_store", PPLL_STORE),
            ("ppll_store_msaa", PPLL_STORE_MSAA),
            ("ppll_blend", PPLL_BLEND),
            ("msm_depth", MSM_DEPTH),
            ("msm_depth_hair", MSM_DEPTH_HAIR),
            ("msm_filter", MSM_FILTER),
            ("platte", PLATTE),
            ("present", PRESENT),
        ] {
            validate(name, src);
        }
    }

    // ── entry points ──────────────────────────────────────────────────────

    #[test]
    fn entry_points_match_pipelines() {
        assert_eq!(entry_points(&validate("ppll_store", PPLL_STORE)), ["fs_main", "vs_main"]);
        assert_eq!(
            entry_points(&validate("ppll_blend", PPLL_BLEND)),
            ["fs_main", "vs_fullscreen"]
        );
        assert_eq!(
            entry_points(&validate("msm_depth", MSM_DEPTH)),
            ["fs_cutout", "fs_opaque", "vs_mesh"]
        );
        assert_eq!(
            entry_points(&validate("msm_depth_hair", MSM_DEPTH_HAIR)),
            ["fs_main", "vs_hair"]
        );
        assert_eq!(
            entry_points(&validate("platte", PLATTE)),
            ["fs_cutout", "fs_cutout_coverage", "fs_opaque", "vs_main"]
        );
        assert_eq!(entry_points(&validate("msm_filter", MSM_FILTER)), ["cs_main"]);
        assert_eq!(entry_points(&validate("present", PRESENT)), ["fs_main", "vs_fullscreen"]);
    }

    // ── moment constants ──────────────────────────────────────────────────

    #[test]
    fn moment_matrices_match_cpu_encoding() {
        use crate::render::msm::moments::{DECODE, ENCODE, MOMENT_OFFSET};

        // Each WGSL column holds one row of the CPU matrix.
        let flat = |rows: &[[f32; 4]; 4]| -> Vec<f32> { rows.iter().flatten().copied().collect() };
        for (name, src) in [("platte", PLATTE), ("ppll_store", PPLL_STORE), ("msm_depth", MSM_DEPTH)] {
            let module = validate(name, src);
            assert_floats_eq("MSM_ENCODE", &const_floats(&module, "MSM_ENCODE"), &flat(&ENCODE));
            assert_floats_eq("MSM_DECODE", &const_floats(&module, "MSM_DECODE"), &flat(&DECODE));
            assert_floats_eq("MSM_OFFSET", &const_floats(&module, "MSM_OFFSET"), &[MOMENT_OFFSET]);
        }
    }

    #[test]
    fn coverage_sample_count_matches_pipeline() {
        use crate::render::platte::COVERAGE_SAMPLES;

        let module = validate("platte", PLATTE);
        assert_eq!(const_floats(&module, "COVERAGE_SAMPLES"), [COVERAGE_SAMPLES as f32]);
    }

    // ── uniform layouts ───────────────────────────────────────────────────

    #[test]
    fn uniform_blocks_match_rust_layouts() {
        use crate::render::gpu_scene::MaterialUniform;
        use crate::render::msm::{FilterParams, ShadowParams};
        use crate::render::platte::PlatteParams;
        use crate::render::ppll::{BlendParams, StoreParams};
        use std::mem::size_of;

        let store = validate("ppll_store", PPLL_STORE);
        assert_eq!(struct_size(&store, "StoreParams"), size_of::<StoreParams>());
        let blend = validate("ppll_blend", PPLL_BLEND);
        assert_eq!(struct_size(&blend, "BlendParams"), size_of::<BlendParams>());
        assert_eq!(struct_size(&blend, "FragmentNode"), 12);
        let depth = validate("msm_depth", MSM_DEPTH);
        assert_eq!(struct_size(&depth, "ShadowParams"), size_of::<ShadowParams>());
        assert_eq!(struct_size(&depth, "Material"), size_of::<MaterialUniform>());
        let filter = validate("msm_filter", MSM_FILTER);
        assert_eq!(struct_size(&filter, "FilterParams"), size_of::<FilterParams>());
        let platte = validate("platte", PLATTE);
        assert_eq!(struct_size(&platte, "PlatteParams"), size_of::<PlatteParams>());
    }
}
