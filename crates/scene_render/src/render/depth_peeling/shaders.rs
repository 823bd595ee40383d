//! GLSL sources of the eight peeling programs
//!
//! Geometry passes shade with the vertex colour and replace its alpha with
//! `u_Alpha * a_Color.a`. Full-screen passes read their inputs with
//! `texelFetch`, so the targets need no filtering or mipmaps. Offscreen
//! passes cover the targets from the origin; the final passes subtract the
//! camera viewport origin.

/// Vertex stage of every pass that draws the scene
pub(crate) const SCENE_VERTEX: &str = "#version 330 core
uniform mat4 u_ModelViewProjectionMatrix;
in vec3 a_Position;
in vec4 a_Color;
out vec4 v_Color;
void main() {
    v_Color = a_Color;
    gl_Position = u_ModelViewProjectionMatrix * vec4(a_Position, 1.0);
}
";

/// Vertex stage of every full-screen pass
pub(crate) const QUAD_VERTEX: &str = "#version 330 core
in vec3 a_Position;
void main() {
    gl_Position = vec4(a_Position.xy, 0.0, 1.0);
}
";

// === Dual depth peeling ===

pub(crate) const DUAL_INIT_FRAGMENT: &str = "#version 330 core
out vec2 o_Depth;
void main() {
    o_Depth = vec2(-gl_FragCoord.z, gl_FragCoord.z);
}
";

pub(crate) const DUAL_PEEL_FRAGMENT: &str = "#version 330 core
#define MAX_DEPTH 1.0
uniform sampler2D u_DepthBlender;
uniform sampler2D u_FrontBlender;
uniform float u_Alpha;
in vec4 v_Color;
layout(location = 0) out vec2 o_Depth;
layout(location = 1) out vec4 o_FrontColor;
layout(location = 2) out vec4 o_BackColor;
void main() {
    float depth = gl_FragCoord.z;
    ivec2 texel = ivec2(gl_FragCoord.xy);
    vec2 bounds = texelFetch(u_DepthBlender, texel, 0).xy;
    vec4 front = texelFetch(u_FrontBlender, texel, 0);

    o_Depth = vec2(-MAX_DEPTH);
    o_FrontColor = front;
    o_BackColor = vec4(0.0);

    float nearest = -bounds.x;
    float farthest = bounds.y;
    float transmittance = 1.0 - front.a;

    if (depth < nearest || depth > farthest) {
        return;
    }
    if (depth > nearest && depth < farthest) {
        o_Depth = vec2(-depth, depth);
        return;
    }

    vec4 color = vec4(v_Color.rgb, v_Color.a * u_Alpha);
    if (depth == nearest) {
        o_FrontColor.rgb += color.rgb * color.a * transmittance;
        o_FrontColor.a = 1.0 - transmittance * (1.0 - color.a);
    } else {
        o_BackColor += color;
    }
}
";

pub(crate) const DUAL_BLEND_FRAGMENT: &str = "#version 330 core
uniform sampler2D u_TempTex;
out vec4 o_Color;
void main() {
    o_Color = texelFetch(u_TempTex, ivec2(gl_FragCoord.xy), 0);
    if (o_Color.a == 0.0) {
        discard;
    }
}
";

pub(crate) const DUAL_FINAL_FRAGMENT: &str = "#version 330 core
uniform sampler2D u_FrontBlender;
uniform sampler2D u_BackBlender;
uniform vec2 u_ViewportOrigin;
out vec4 o_Color;
void main() {
    ivec2 texel = ivec2(gl_FragCoord.xy - u_ViewportOrigin);
    vec4 front = texelFetch(u_FrontBlender, texel, 0);
    vec3 back = texelFetch(u_BackBlender, texel, 0).rgb;
    o_Color = vec4(front.rgb + back * (1.0 - front.a), 1.0);
}
";

// === Front-to-back peeling ===

pub(crate) const FRONT_INIT_FRAGMENT: &str = "#version 330 core
uniform float u_Alpha;
in vec4 v_Color;
out vec4 o_Color;
void main() {
    float alpha = v_Color.a * u_Alpha;
    o_Color = vec4(v_Color.rgb * alpha, 1.0 - alpha);
}
";

pub(crate) const FRONT_PEEL_FRAGMENT: &str = "#version 330 core
uniform sampler2D u_DepthTex;
uniform float u_Alpha;
in vec4 v_Color;
out vec4 o_Color;
void main() {
    float front = texelFetch(u_DepthTex, ivec2(gl_FragCoord.xy), 0).r;
    if (gl_FragCoord.z <= front) {
        discard;
    }
    float alpha = v_Color.a * u_Alpha;
    o_Color = vec4(v_Color.rgb * alpha, alpha);
}
";

pub(crate) const FRONT_BLEND_FRAGMENT: &str = "#version 330 core
uniform sampler2D u_TempTex;
out vec4 o_Color;
void main() {
    o_Color = texelFetch(u_TempTex, ivec2(gl_FragCoord.xy), 0);
}
";

pub(crate) const FRONT_FINAL_FRAGMENT: &str = "#version 330 core
uniform sampler2D u_ColorTex;
uniform vec3 u_BackgroundColor;
uniform vec2 u_ViewportOrigin;
out vec4 o_Color;
void main() {
    vec4 front = texelFetch(u_ColorTex, ivec2(gl_FragCoord.xy - u_ViewportOrigin), 0);
    o_Color = vec4(front.rgb + u_BackgroundColor * front.a, 1.0);
}
";

/// Name, vertex and fragment source of each program, in [`super::PeelingPrograms`] order
pub(crate) const PROGRAMS: [(&str, &str, &str); 8] = [
    ("dual_init", SCENE_VERTEX, DUAL_INIT_FRAGMENT),
    ("dual_peel", SCENE_VERTEX, DUAL_PEEL_FRAGMENT),
    ("dual_blend", QUAD_VERTEX, DUAL_BLEND_FRAGMENT),
    ("dual_final", QUAD_VERTEX, DUAL_FINAL_FRAGMENT),
    ("front_init", SCENE_VERTEX, FRONT_INIT_FRAGMENT),
    ("front_peel", SCENE_VERTEX, FRONT_PEEL_FRAGMENT),
    ("front_blend", QUAD_VERTEX, FRONT_BLEND_FRAGMENT),
    ("front_final", QUAD_VERTEX, FRONT_FINAL_FRAGMENT),
];
