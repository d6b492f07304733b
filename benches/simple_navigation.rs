use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;
use navkit::{bake, config::BakerConfig, math::Triangle};

fn flat_plane(half_extent: f32) -> Vec<Triangle> {
    vec![
        Triangle::new(Vec3::new(-half_extent, 0.0, -half_extent), Vec3::new(half_extent, 0.0, -half_extent), Vec3::new(half_extent, 0.0, half_extent)),
        Triangle::new(Vec3::new(-half_extent, 0.0, -half_extent), Vec3::new(half_extent, 0.0, half_extent), Vec3::new(-half_extent, 0.0, half_extent)),
    ]
}

fn cluttered_plane(half_extent: f32) -> Vec<Triangle> {
    let mut triangles = flat_plane(half_extent);
    for (cx, cz) in [(3.0, 3.0), (-3.0, 3.0), (3.0, -3.0), (-3.0, -3.0)] {
        triangles.push(Triangle::new(
            Vec3::new(cx - 1.0, 1.0, cz - 1.0),
            Vec3::new(cx + 1.0, 1.0, cz - 1.0),
            Vec3::new(cx + 1.0, 1.0, cz + 1.0),
        ));
    }
    triangles
}

fn criterion_benchmark(c: &mut Criterion) {
    let settings = BakerConfig::default();
    let simple_mesh = bake(&flat_plane(12.5), &settings).expect("flat plane bakes");
    let cluttered_mesh = bake(&cluttered_plane(12.5), &settings).expect("cluttered plane bakes");

    c.bench_function("bake simple geometry", |b| {
        b.iter(|| black_box(bake(&flat_plane(12.5), &settings)))
    });
    c.bench_function("bake cluttered geometry", |b| {
        b.iter(|| black_box(bake(&cluttered_plane(12.5), &settings)))
    });

    c.bench_function("search path over simple navmesh", |b| {
        b.iter(|| black_box(simple_mesh.search_path(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0))))
    });
    c.bench_function("search path over cluttered navmesh", |b| {
        b.iter(|| black_box(cluttered_mesh.search_path(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0))))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
