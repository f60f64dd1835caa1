//! WGSL sources for the native renderer. All three share the global uniform
//! block at group 0 and one per-draw uniform block at group 1.

pub const LIT_SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    ambient: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    emissive: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(globals.light_position.xyz - input.world_pos);
    let view_dir = normalize(globals.camera_position.xyz - input.world_pos);
    let normal = normalize(input.normal);
    let diffuse = max(dot(normal, light_dir), 0.0);

    // emissive.w carries metalness
    let half_dir = normalize(light_dir + view_dir);
    let shininess = mix(8.0, 64.0, object.emissive.w);
    let specular = pow(max(dot(normal, half_dir), 0.0), shininess) * object.emissive.w;

    let intensity = globals.light_color.w;
    let light_color = globals.light_color.xyz;
    let lit_color = globals.ambient.xyz * object.color.rgb
        + (diffuse * object.color.rgb + specular) * light_color * intensity
        + object.emissive.xyz;
    return vec4<f32>(lit_color, object.color.a);
}
"#;

pub const HOLOGRAM_SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    ambient: vec4<f32>,
}

struct Hologram {
    // rgb + opacity
    color: vec4<f32>,
    // rim power, rim intensity, wireframe width, wireframe density
    rim: vec4<f32>,
    // scanline intensity, scanline count, grid intensity, glitch intensity
    effects: vec4<f32>,
    time: vec4<f32>,
}

struct HologramObject {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    hologram: Hologram,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: HologramObject;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) local_pos: vec3<f32>,
}

fn hash(value: f32) -> f32 {
    return fract(sin(value * 127.1) * 43758.5453);
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    let time = object.hologram.time.x;
    let glitch = object.hologram.effects.w;

    // Horizontal bands jump sideways for a few frames at a time.
    var local = input.position;
    let band = floor(local.y * 10.0 + time * 4.0);
    let active = step(0.92, hash(band + floor(time * 12.0)));
    local.x = local.x + (hash(band) - 0.5) * active * glitch;

    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(local, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;
    out.local_pos = input.position;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    let h = object.hologram;
    let time = h.time.x;

    var normal = normalize(input.normal);
    if (!front) {
        normal = -normal;
    }
    let view_dir = normalize(globals.camera_position.xyz - input.world_pos);
    let rim = pow(1.0 - abs(dot(normal, view_dir)), h.rim.x) * h.rim.y;

    let cell = abs(fract(input.local_pos * h.rim.w) - vec3<f32>(0.5));
    let edge = 0.5 - max(max(cell.x, cell.y), cell.z);
    let wire = 1.0 - smoothstep(0.0, max(h.rim.z * 0.05, 0.0001), edge);

    let scan = sin(input.world_pos.y * h.effects.y - time * 2.0) * 0.5 + 0.5;
    let scanline = scan * h.effects.x;

    let grid_cell = abs(fract(input.world_pos.xz * 4.0) - vec2<f32>(0.5));
    let grid = (1.0 - smoothstep(0.0, 0.05, 0.5 - max(grid_cell.x, grid_cell.y))) * h.effects.z;

    let flicker = 1.0 - h.effects.w * hash(floor(time * 20.0));
    let intensity = (h.color.a + rim + wire * 0.5 + scanline + grid) * flicker;
    let alpha = clamp(h.color.a + rim * 0.5, 0.0, 1.0);
    return vec4<f32>(h.color.rgb * intensity, alpha);
}
"#;

pub const LINE_SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    ambient: vec4<f32>,
}

struct LineObject {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    emissive: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: LineObject;

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> @builtin(position) vec4<f32> {
    return globals.view_proj * object.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return object.color;
}
"#;
